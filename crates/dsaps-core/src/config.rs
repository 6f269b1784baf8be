//! Centralized configuration for the DSpace batch client.
//!
//! Compile-time constants for network behaviour, pagination, audit files and
//! provenance notes, plus the runtime [`ClientConfig`] used to build a session.

use std::time::Duration;

use crate::{DsapsError, Result};

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const USER_AGENT: &'static str = "dsaps/0.3";
    pub const SESSION_COOKIE: &'static str = "JSESSIONID";
}

/// Filtered-item pagination.
pub struct PaginationConfig;

impl PaginationConfig {
    /// Page size for flows that only need item links.
    pub const MUTATION_PAGE_SIZE: u32 = 200;
    /// Page size for flows that ask the server to expand metadata.
    pub const EXPANDED_PAGE_SIZE: u32 = 20;
}

/// Audit file naming.
pub struct AuditConfig;

impl AuditConfig {
    pub const DELETED_VALUES_PREFIX: &'static str = "deletedValues";
    pub const FILE_TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H.%M.%S";
    pub const HEADER: [&'static str; 5] = ["handle", "deletedValue", "delete", "post", "outcome"];
}

/// Provenance notes written by batch edits.
pub struct ProvenanceConfig;

impl ProvenanceConfig {
    pub const KEY: &'static str = "dc.description.provenance";
    pub const LANGUAGE: &'static str = "en_US";
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";
}

/// Runtime settings for a DSpace REST session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base, e.g. `https://dspace.example.edu/rest`.
    pub base_url: String,
    pub timeout: Duration,
    /// Set to false to accept self-signed certificates on staging servers.
    pub verify_tls: bool,
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a config for the given REST base URL with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: NetworkConfig::REQUEST_TIMEOUT,
            verify_tls: true,
            user_agent: NetworkConfig::USER_AGENT.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Parse the base URL, normalized to end with a slash so relative
    /// endpoint paths join underneath it.
    pub fn parsed_base_url(&self) -> Result<url::Url> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(DsapsError::Config {
                message: "DSpace base URL is empty".to_string(),
            });
        }
        url::Url::parse(&format!("{}/", trimmed)).map_err(|e| DsapsError::InvalidUrl {
            url: self.base_url.clone(),
            message: e.to_string(),
        })
    }
}
