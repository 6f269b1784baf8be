//! Append-only audit log of batch metadata edits.
//!
//! Every processed item gets one row, written and flushed before the next
//! item starts, so the file left behind by an interrupted run is accurate up
//! to the last completed item. Rows are written under a lock; concurrent
//! workers never interleave partial rows.

use chrono::NaiveDateTime;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::AuditConfig;
use crate::models::AuditRecord;
use crate::{DsapsError, Result};

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Durably append one record.
    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// File name of the audit log for a run started at `started`.
pub fn audit_file_name(started: NaiveDateTime) -> String {
    format!(
        "{}{}.csv",
        AuditConfig::DELETED_VALUES_PREFIX,
        started.format(AuditConfig::FILE_TIMESTAMP_FORMAT)
    )
}

/// CSV audit log, one flushed row per record.
pub struct CsvAuditSink {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl std::fmt::Debug for CsvAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvAuditSink").field("path", &self.path).finish()
    }
}

impl CsvAuditSink {
    /// Create `deletedValues<timestamp>.csv` in `dir`. Fails rather than
    /// overwrite the log of another run.
    pub fn create_in(dir: &Path, started: NaiveDateTime) -> Result<Self> {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| DsapsError::io_with_path(e, dir))?;
        }
        Self::create(&dir.join(audit_file_name(started)))
    }

    /// Create a new audit log at `path` and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| DsapsError::io_with_path(e, path))?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(AuditConfig::HEADER)?;
        writer
            .flush()
            .map_err(|e| DsapsError::io_with_path(e, path))?;

        info!("Audit log: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for CsvAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| DsapsError::Other("audit log lock poisoned".to_string()))?;

        writer.write_record(record.csv_fields())?;
        writer
            .flush()
            .map_err(|e| DsapsError::io_with_path(e, &self.path))?;

        debug!("Audited {} ({})", record.item, record.outcome);
        Ok(())
    }
}

/// In-memory sink, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| DsapsError::Other("audit buffer lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallStatus, ItemReference};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn started() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
    }

    fn record(n: usize) -> AuditRecord {
        AuditRecord::written(
            ItemReference::new(format!("/rest/items/{}", n)),
            "dc.subject",
            CallStatus::Status(200),
            CallStatus::Status(200),
        )
    }

    #[test]
    fn test_file_name_uses_run_start() {
        assert_eq!(audit_file_name(started()), "deletedValues2024-03-09 14.05.07.csv");
    }

    #[test]
    fn test_rows_are_readable_after_each_record() {
        let temp_dir = TempDir::new().unwrap();
        let sink = CsvAuditSink::create_in(temp_dir.path(), started()).unwrap();

        sink.record(&record(1)).unwrap();

        // Read while the sink is still open: the row must already be on disk.
        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(
            contents,
            "handle,deletedValue,delete,post,outcome\n/rest/items/1,dc.subject,200,200,success\n"
        );
    }

    #[test]
    fn test_refuses_to_overwrite_existing_log() {
        let temp_dir = TempDir::new().unwrap();
        let _first = CsvAuditSink::create_in(temp_dir.path(), started()).unwrap();
        let second = CsvAuditSink::create_in(temp_dir.path(), started());
        assert!(matches!(second, Err(DsapsError::Io { .. })));
    }

    #[test]
    fn test_concurrent_records_stay_whole() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(CsvAuditSink::create_in(temp_dir.path(), started()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        sink.record(&record(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut reader = csv::Reader::from_path(sink.path()).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 200);
        assert!(rows.iter().all(|r| r.len() == 5 && &r[4] == "success"));
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        sink.record(&record(1)).unwrap();
        sink.record(&record(2)).unwrap();
        let items: Vec<String> = sink.records().iter().map(|r| r.item.to_string()).collect();
        assert_eq!(items, vec!["/rest/items/1", "/rest/items/2"]);
    }
}
