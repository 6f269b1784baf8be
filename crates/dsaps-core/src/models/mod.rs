//! Data models for the DSpace REST API and for batch-run bookkeeping.
//!
//! Repository entities deserialize straight from the server's JSON through
//! declared serde field mappings; anything the server sends that is not
//! declared here is ignored.

mod dspace;
mod metadata;
mod mutation;
mod search;

pub use dspace::*;
pub use metadata::*;
pub use mutation::*;
pub use search::*;
