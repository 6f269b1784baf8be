//! Per-item mutation results and the audit rows built from them.

use serde::Serialize;

use super::ItemReference;

/// What happened to one HTTP call of a read-modify-write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum CallStatus {
    /// The server answered; the status may still be an error status.
    Status(u16),
    /// The request never produced a response.
    TransportError(String),
    /// The call was not attempted.
    Skipped,
}

impl CallStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CallStatus::Status(code) if (200..300).contains(code))
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallStatus::Status(code) => write!(f, "{}", code),
            CallStatus::TransportError(message) => write!(f, "error: {}", message),
            CallStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// Overall result of processing one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MutationOutcome {
    Success,
    /// The delete did not succeed; the put was still issued.
    DeleteFailed,
    /// The put did not succeed. If the delete did, the item may now have no
    /// metadata at all.
    PutFailed,
    /// Current metadata could not be read; nothing was written.
    FetchFailed,
}

impl MutationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOutcome::Success => "success",
            MutationOutcome::DeleteFailed => "delete_failed",
            MutationOutcome::PutFailed => "put_failed",
            MutationOutcome::FetchFailed => "fetch_failed",
        }
    }

    /// Derive the outcome from the two write calls of a fetched item.
    pub fn from_writes(delete: &CallStatus, put: &CallStatus) -> Self {
        if !put.is_success() {
            MutationOutcome::PutFailed
        } else if !delete.is_success() {
            MutationOutcome::DeleteFailed
        } else {
            MutationOutcome::Success
        }
    }
}

impl std::fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the deleted-values audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub item: ItemReference,
    pub deleted_key: String,
    pub delete: CallStatus,
    pub put: CallStatus,
    pub outcome: MutationOutcome,
}

impl AuditRecord {
    pub fn fetch_failed(item: ItemReference, deleted_key: impl Into<String>) -> Self {
        Self {
            item,
            deleted_key: deleted_key.into(),
            delete: CallStatus::Skipped,
            put: CallStatus::Skipped,
            outcome: MutationOutcome::FetchFailed,
        }
    }

    pub fn written(
        item: ItemReference,
        deleted_key: impl Into<String>,
        delete: CallStatus,
        put: CallStatus,
    ) -> Self {
        let outcome = MutationOutcome::from_writes(&delete, &put);
        Self {
            item,
            deleted_key: deleted_key.into(),
            delete,
            put,
            outcome,
        }
    }

    /// CSV fields in header order.
    pub fn csv_fields(&self) -> [String; 5] {
        [
            self.item.to_string(),
            self.deleted_key.clone(),
            self.delete.to_string(),
            self.put.to_string(),
            self.outcome.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_writes() {
        let ok = CallStatus::Status(200);
        let gone = CallStatus::Status(404);
        let down = CallStatus::TransportError("connection reset".into());

        assert_eq!(MutationOutcome::from_writes(&ok, &ok), MutationOutcome::Success);
        assert_eq!(MutationOutcome::from_writes(&gone, &ok), MutationOutcome::DeleteFailed);
        assert_eq!(MutationOutcome::from_writes(&ok, &down), MutationOutcome::PutFailed);
        // A failed put dominates: the item is the most likely to be damaged.
        assert_eq!(MutationOutcome::from_writes(&gone, &gone), MutationOutcome::PutFailed);
    }

    #[test]
    fn test_csv_fields() {
        let record = AuditRecord::written(
            ItemReference::new("/rest/items/abc"),
            "dc.subject",
            CallStatus::Status(200),
            CallStatus::Status(500),
        );
        assert_eq!(
            record.csv_fields(),
            [
                "/rest/items/abc".to_string(),
                "dc.subject".to_string(),
                "200".to_string(),
                "500".to_string(),
                "put_failed".to_string(),
            ]
        );

        let skipped = AuditRecord::fetch_failed(ItemReference::new("/rest/items/x"), "dc.subject");
        assert_eq!(skipped.csv_fields()[2], "skipped");
        assert_eq!(skipped.outcome, MutationOutcome::FetchFailed);
    }
}
