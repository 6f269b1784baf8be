//! The delete-key batch job.
//!
//! A run resolves the community's collections once, collects every item that
//! carries the key, then rewrites the items one by one (or a bounded number
//! at a time) and audits each result before moving on. The full reference
//! list is collected before the first edit: the search predicate is
//! `exists`, so editing while paging would shrink the result set under the
//! offset and skip items.

use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::audit::AuditSink;
use crate::cancel::CancellationToken;
use crate::config::PaginationConfig;
use crate::executor::{Clock, MutationExecutor};
use crate::models::{AuditRecord, MutationOutcome, SearchPredicate};
use crate::network::RetryConfig;
use crate::pagination::Paginator;
use crate::records::resolve_collection_scope;
use crate::session::Session;
use crate::transform::ProvenanceMode;
use crate::{DsapsError, Result};

/// Tuning for a delete-key run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Search page size.
    pub page_size: u32,
    /// Items edited at the same time. 1 reproduces the sequential tool.
    pub concurrency: usize,
    pub provenance_mode: ProvenanceMode,
    /// Retry policy for reads. Writes are never retried.
    pub retry: RetryConfig,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            page_size: PaginationConfig::MUTATION_PAGE_SIZE,
            concurrency: 1,
            provenance_mode: ProvenanceMode::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Totals of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items_processed: usize,
    pub succeeded: usize,
    pub delete_failed: usize,
    pub put_failed: usize,
    pub fetch_failed: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    fn tally(&mut self, record: &AuditRecord) {
        self.items_processed += 1;
        match record.outcome {
            MutationOutcome::Success => self.succeeded += 1,
            MutationOutcome::DeleteFailed => self.delete_failed += 1,
            MutationOutcome::PutFailed => self.put_failed += 1,
            MutationOutcome::FetchFailed => self.fetch_failed += 1,
        }
    }

    /// Items whose edit did not fully succeed.
    pub fn failures(&self) -> usize {
        self.items_processed - self.succeeded
    }

    pub fn elapsed_hms(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

/// Format a duration as `h:mm:ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Removes one metadata key from every item in a community.
#[derive(Debug, Clone)]
pub struct DeleteKeyJob {
    community_handle: String,
    target_key: String,
    options: RunOptions,
    executor: MutationExecutor,
}

impl DeleteKeyJob {
    pub fn new(community_handle: impl Into<String>, target_key: impl Into<String>) -> Self {
        Self::with_options(community_handle, target_key, RunOptions::default())
    }

    pub fn with_options(
        community_handle: impl Into<String>,
        target_key: impl Into<String>,
        options: RunOptions,
    ) -> Self {
        let executor =
            MutationExecutor::new(options.provenance_mode).with_retry(options.retry.clone());
        Self {
            community_handle: community_handle.into(),
            target_key: target_key.into(),
            options,
            executor,
        }
    }

    /// Override the provenance timestamp source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.executor = self.executor.with_clock(clock);
        self
    }

    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    /// Run the job to completion.
    ///
    /// Per-item failures are audited and do not stop the run. Failing to
    /// resolve the community, failing a search page, failing to write the
    /// audit log and cancellation abort it; every row written before the
    /// abort stays in the log.
    pub async fn run<S>(
        &self,
        session: &S,
        sink: &dyn AuditSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary>
    where
        S: Session + ?Sized,
    {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        if self.target_key.trim().is_empty() {
            return Err(DsapsError::Validation {
                field: "key".to_string(),
                message: "metadata key must not be empty".to_string(),
            });
        }

        let scope =
            resolve_collection_scope(session, &self.community_handle, &self.options.retry).await?;
        if scope.is_unrestricted() {
            // An empty collSel[] would search the whole repository.
            warn!("Community {} has no collections; nothing to do", self.community_handle);
            summary.elapsed = started.elapsed();
            return Ok(summary);
        }

        let paginator = Paginator::new(SearchPredicate::exists(&self.target_key), scope)
            .with_page_size(self.options.page_size)
            .with_retry(self.options.retry.clone());
        let references = paginator.collect_references(session).await?;
        let total = references.len();
        info!(
            "{} items in {} carry '{}'",
            total, self.community_handle, self.target_key
        );

        // Stops new edits after an audit failure; in-flight edits still finish.
        let halt = CancellationToken::new();
        let executor = &self.executor;
        let target_key = self.target_key.as_str();
        let halt_ref = &halt;

        let mut results = stream::iter(references.iter())
            .map(move |item| async move {
                cancel.check()?;
                halt_ref.check()?;
                Ok::<AuditRecord, DsapsError>(executor.apply(item, target_key, session).await)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        let mut abort: Option<DsapsError> = None;
        while let Some(result) = results.next().await {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    abort.get_or_insert(e);
                    continue;
                }
            };

            if let Err(e) = sink.record(&record) {
                error!("Could not audit {}: {}", record.item, e);
                halt.cancel();
                abort.get_or_insert(e);
            }
            summary.tally(&record);
            info!(
                "{}/{} {} {}",
                summary.items_processed, total, record.item, record.outcome
            );
        }

        summary.elapsed = started.elapsed();
        if let Some(reason) = abort {
            // An audit failure halts through `halt`, which also reports
            // Cancelled; keep the first cause.
            warn!(
                "Run aborted after {} of {} items: {}",
                summary.items_processed, total, reason
            );
            return Err(reason);
        }

        info!(
            "Removed '{}' from {} items ({} failures) in {}",
            self.target_key,
            summary.items_processed,
            summary.failures(),
            summary.elapsed_hms()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::models::CallStatus;
    use crate::test_support::ScriptedSession;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Keeps rows until the `fail_on`th write, which errors.
    struct FailingSink {
        inner: MemoryAuditSink,
        fail_on: usize,
        calls: AtomicUsize,
    }

    impl AuditSink for FailingSink {
        fn record(&self, record: &AuditRecord) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(DsapsError::Other("audit disk full".to_string()));
            }
            self.inner.record(record)
        }
    }

    /// Cancels the run from inside the first write.
    struct CancellingSink {
        inner: MemoryAuditSink,
        cancel: CancellationToken,
    }

    impl AuditSink for CancellingSink {
        fn record(&self, record: &AuditRecord) -> Result<()> {
            self.inner.record(record)?;
            self.cancel.cancel();
            Ok(())
        }
    }

    fn scripted_community(items: &[&str]) -> ScriptedSession {
        let session = ScriptedSession::new();
        session.push_get("handle/abc/123", 200, json!({"uuid": "comm-1"}));
        session.push_get(
            "communities/comm-1/collections",
            200,
            json!([{"uuid": "coll-a"}]),
        );
        let page: Vec<Value> = items.iter().map(|link| json!({"link": link})).collect();
        session.push_get("filtered-items", 200, json!({ "items": page }));
        session.push_get("filtered-items", 200, json!({"items": []}));
        for link in items {
            session.push_get(
                &format!("{}/metadata", link),
                200,
                json!([{"key": "dc.subject", "value": "x", "language": null}]),
            );
        }
        session
    }

    fn options() -> RunOptions {
        RunOptions {
            retry: RetryConfig::disabled(),
            ..RunOptions::default()
        }
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3_725)), "1:02:05");
        assert_eq!(format_elapsed(Duration::from_millis(59_999)), "0:00:59");
    }

    #[tokio::test]
    async fn test_every_item_is_audited() {
        let session = scripted_community(&["/rest/items/1", "/rest/items/2"]);
        let sink = MemoryAuditSink::new();

        let summary = DeleteKeyJob::with_options("abc/123", "dc.subject", options())
            .run(&session, &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.items_processed, 2);
        assert_eq!(summary.succeeded, 2);
        let audited: Vec<String> = sink.records().iter().map(|r| r.item.to_string()).collect();
        assert_eq!(audited, vec!["/rest/items/1", "/rest/items/2"]);

        // Scope and predicate reach the search.
        let search = &session.calls_to("GET", "filtered-items")[0];
        assert_eq!(search.query_value("collSel[]"), Some("coll-a"));
        assert_eq!(search.query_value("query_op[]"), Some("exists"));
        assert_eq!(search.query_value("limit"), Some("200"));
    }

    #[tokio::test]
    async fn test_references_collected_before_first_edit() {
        let session = scripted_community(&["/rest/items/1"]);
        let sink = MemoryAuditSink::new();

        DeleteKeyJob::with_options("abc/123", "dc.subject", options())
            .run(&session, &sink, &CancellationToken::new())
            .await
            .unwrap();

        let calls = session.calls();
        let last_search = calls.iter().rposition(|c| c.path == "filtered-items").unwrap();
        let first_delete = calls.iter().position(|c| c.method == "DELETE").unwrap();
        assert!(last_search < first_delete);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_stop_run() {
        let session = ScriptedSession::new();
        session.push_get("handle/abc/123", 200, json!({"uuid": "comm-1"}));
        session.push_get("communities/comm-1/collections", 200, json!([{"uuid": "coll-a"}]));
        session.push_get(
            "filtered-items",
            200,
            json!({"items": [{"link": "/rest/items/gone"}, {"link": "/rest/items/ok"}]}),
        );
        session.push_get("filtered-items", 200, json!({"items": []}));
        session.push_get("/rest/items/ok/metadata", 200, json!([]));
        let sink = MemoryAuditSink::new();

        let summary = DeleteKeyJob::with_options("abc/123", "dc.subject", options())
            .run(&session, &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.items_processed, 2);
        assert_eq!(summary.fetch_failed, 1);
        let records = sink.records();
        assert_eq!(records[0].outcome, MutationOutcome::FetchFailed);
        assert_eq!(records[0].delete, CallStatus::Skipped);
        assert_eq!(records[1].outcome, MutationOutcome::Success);
        assert!(session.calls_to("DELETE", "/rest/items/gone/metadata").is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_aborts_before_edits() {
        let session = ScriptedSession::new();
        session.push_get("handle/abc/123", 200, json!({"uuid": "comm-1"}));
        session.push_get("communities/comm-1/collections", 200, json!([{"uuid": "coll-a"}]));
        session.push_get("filtered-items", 500, Value::Null);
        let sink = MemoryAuditSink::new();

        let err = DeleteKeyJob::with_options("abc/123", "dc.subject", options())
            .run(&session, &sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DsapsError::Pagination { offset: 0, .. }));
        assert!(sink.records().is_empty());
        assert!(session.calls().iter().all(|c| c.method == "GET"));
    }

    #[tokio::test]
    async fn test_cancelled_run_makes_no_edits() {
        let session = scripted_community(&["/rest/items/1", "/rest/items/2"]);
        let sink = MemoryAuditSink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = DeleteKeyJob::with_options("abc/123", "dc.subject", options())
            .run(&session, &sink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, DsapsError::Cancelled));
        assert!(sink.records().is_empty());
        assert!(session.calls_to("DELETE", "/rest/items/1/metadata").is_empty());
    }

    #[tokio::test]
    async fn test_community_without_collections_is_not_searched() {
        let session = ScriptedSession::new();
        session.push_get("handle/abc/123", 200, json!({"uuid": "comm-1"}));
        session.push_get("communities/comm-1/collections", 200, json!([]));
        let sink = MemoryAuditSink::new();

        let summary = DeleteKeyJob::with_options("abc/123", "dc.subject", options())
            .run(&session, &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.items_processed, 0);
        assert_eq!(session.get_count("filtered-items"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_run_audits_each_item_once() {
        let links: Vec<String> = (0..10).map(|i| format!("/rest/items/{}", i)).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let session = scripted_community(&refs);
        let sink = MemoryAuditSink::new();

        let summary = DeleteKeyJob::with_options(
            "abc/123",
            "dc.subject",
            RunOptions {
                concurrency: 4,
                ..options()
            },
        )
        .run(&session, &sink, &CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(summary.items_processed, 10);
        let mut audited: Vec<String> = sink.records().iter().map(|r| r.item.to_string()).collect();
        audited.sort();
        let mut expected = links.clone();
        expected.sort();
        assert_eq!(audited, expected);
    }

    #[tokio::test]
    async fn test_audit_failure_stops_later_edits() {
        let links: Vec<String> = (1..=5).map(|i| format!("/rest/items/{}", i)).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let session = scripted_community(&refs);
        let sink = FailingSink {
            inner: MemoryAuditSink::new(),
            fail_on: 2,
            calls: AtomicUsize::new(0),
        };

        let err = DeleteKeyJob::with_options("abc/123", "dc.subject", options())
            .run(&session, &sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DsapsError::Other(ref message) if message == "audit disk full"));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.inner.records().len(), 1);
        // The failed row's edit already happened; nothing after it is touched.
        assert_eq!(session.calls_to("PUT", "/rest/items/2/metadata").len(), 1);
        for link in &links[2..] {
            let metadata = format!("{}/metadata", link);
            assert!(session.calls_to("DELETE", &metadata).is_empty());
            assert!(session.calls_to("PUT", &metadata).is_empty());
        }
    }

    #[tokio::test]
    async fn test_cancel_during_run_keeps_audited_rows() {
        let session = scripted_community(&["/rest/items/1", "/rest/items/2", "/rest/items/3"]);
        let cancel = CancellationToken::new();
        let sink = CancellingSink {
            inner: MemoryAuditSink::new(),
            cancel: cancel.clone(),
        };

        let err = DeleteKeyJob::with_options("abc/123", "dc.subject", options())
            .run(&session, &sink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, DsapsError::Cancelled));
        let audited: Vec<String> =
            sink.inner.records().iter().map(|r| r.item.to_string()).collect();
        assert_eq!(audited, vec!["/rest/items/1"]);
        assert!(session.calls_to("DELETE", "/rest/items/2/metadata").is_empty());
        assert!(session.calls_to("DELETE", "/rest/items/3/metadata").is_empty());
    }
}
