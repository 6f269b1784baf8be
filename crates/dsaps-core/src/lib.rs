//! DSAPS Core - batch operations against a DSpace 6 REST API.
//!
//! The central job removes one metadata key from every item of a community,
//! leaving a provenance note in its place and auditing each item to a CSV
//! log. Around it sit record lookups, collection ingest from CSV, an offline
//! file reconciliation and a repository-wide value inventory.
//!
//! Every operation takes the [`Session`] it runs against as an argument;
//! [`DSpaceSession`] is the HTTP implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use dsaps_core::{CancellationToken, ClientConfig, CsvAuditSink, DSpaceSession, DeleteKeyJob};
//!
//! #[tokio::main]
//! async fn main() -> dsaps_core::Result<()> {
//!     let config = ClientConfig::new("https://dspace.example.edu/rest");
//!     let session = DSpaceSession::login(&config, "me@example.edu", "secret").await?;
//!
//!     let started = chrono::Local::now().naive_local();
//!     let sink = CsvAuditSink::create_in(".".as_ref(), started)?;
//!     let summary = DeleteKeyJob::new("1721.1/7830", "dc.subject.other")
//!         .run(&session, &sink, &CancellationToken::new())
//!         .await?;
//!     println!("{} items in {}", summary.items_processed, summary.elapsed_hms());
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod cancel;
pub mod config;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod inventory;
pub mod models;
pub mod network;
pub mod orchestrator;
pub mod pagination;
pub mod reconcile;
pub mod records;
pub mod session;
pub mod transform;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use audit::{AuditSink, CsvAuditSink, MemoryAuditSink};
pub use cancel::CancellationToken;
pub use config::ClientConfig;
pub use error::{DsapsError, Result};
pub use executor::MutationExecutor;
pub use ingest::{FieldMap, IngestReport, NewCollection};
pub use inventory::{InventoryOptions, InventoryReport};
pub use models::{
    AuditRecord, CollectionScope, ItemReference, MetadataEntry, MutationOutcome, QueryOperator,
    RecordType, SearchPredicate,
};
pub use network::{DSpaceSession, RetryConfig};
pub use orchestrator::{format_elapsed, DeleteKeyJob, RunOptions, RunSummary};
pub use pagination::Paginator;
pub use reconcile::Reconciliation;
pub use session::{ApiResponse, Session};
pub use transform::{MetadataTransformer, ProvenanceMode};
