//! Per-item read-modify-write of metadata.
//!
//! The REST API only supports replacing an item's metadata wholesale, so an
//! edit is a fetch, a local rewrite, a `DELETE` of all metadata and a `PUT` of
//! the rewritten list. The delete and the put are not atomic: a put that
//! fails after a successful delete leaves the item with no metadata. Nothing
//! here attempts a rollback; the audit record says what happened.

use chrono::{Local, NaiveDateTime};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::models::{AuditRecord, CallStatus, ItemReference, MetadataEntry};
use crate::network::{get_with_retry, RetryConfig};
use crate::session::Session;
use crate::transform::{count_matches, MetadataTransformer, ProvenanceMode};
use crate::Result;

/// Source of the timestamp written into provenance notes.
pub type Clock = fn() -> NaiveDateTime;

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Applies a key deletion to one item at a time.
#[derive(Debug, Clone)]
pub struct MutationExecutor {
    transformer: MetadataTransformer,
    retry: RetryConfig,
    clock: Clock,
}

impl Default for MutationExecutor {
    fn default() -> Self {
        Self::new(ProvenanceMode::default())
    }
}

impl MutationExecutor {
    pub fn new(mode: ProvenanceMode) -> Self {
        Self {
            transformer: MetadataTransformer::new(mode),
            retry: RetryConfig::default(),
            clock: local_now,
        }
    }

    /// Retry policy for the metadata fetch. Writes are never retried.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Remove `target_key` from `item` and report what happened.
    ///
    /// Never fails: every problem ends up in the returned record.
    pub async fn apply<S>(&self, item: &ItemReference, target_key: &str, session: &S) -> AuditRecord
    where
        S: Session + ?Sized,
    {
        let metadata_path = item.metadata_path();

        let current = match self.fetch_metadata(session, &metadata_path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping {}: could not read metadata: {}", item, e);
                return AuditRecord::fetch_failed(item.clone(), target_key);
            }
        };

        let updated = self.transformer.transform(&current, target_key, (self.clock)());
        let payload = metadata_payload(&updated);

        let delete = call_status(session.delete(&metadata_path).await);
        let put = call_status(session.put(&metadata_path, &payload).await);

        let record = AuditRecord::written(item.clone(), target_key, delete, put);
        info!(
            "Updated {}: removed {} '{}' entries, delete {}, put {}",
            item,
            count_matches(&current, target_key),
            target_key,
            record.delete,
            record.put
        );
        if !record.put.is_success() && record.delete.is_success() {
            warn!("{} may have been left without metadata (put {})", item, record.put);
        }
        record
    }

    async fn fetch_metadata<S>(
        &self,
        session: &S,
        metadata_path: &str,
    ) -> Result<Vec<MetadataEntry>>
    where
        S: Session + ?Sized,
    {
        get_with_retry(session, metadata_path, &[], &self.retry)
            .await?
            .json()
    }
}

fn call_status(result: Result<crate::session::ApiResponse>) -> CallStatus {
    match result {
        Ok(response) => CallStatus::Status(response.status),
        Err(e) => CallStatus::TransportError(e.to_string()),
    }
}

/// Body sent by `PUT .../metadata`.
pub fn metadata_payload(entries: &[MetadataEntry]) -> Value {
    entries
        .iter()
        .map(|entry| json!({"key": entry.key, "value": entry.value, "language": entry.language}))
        .collect()
}
