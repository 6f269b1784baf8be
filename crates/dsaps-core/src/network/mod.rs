//! HTTP transport for the DSpace REST API.
//!
//! This module provides:
//! - The reqwest-backed [`DSpaceSession`]
//! - Bounded retry with exponential backoff for idempotent reads

mod client;
mod retry;

pub use client::DSpaceSession;
pub use retry::{get_with_retry, retry_async, RetryConfig};
