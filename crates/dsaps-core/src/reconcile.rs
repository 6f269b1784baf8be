//! Offline check of a metadata CSV against a directory of files.
//!
//! Files are matched to metadata rows by stem: `thesis-12.pdf` matches a row
//! whose `file_identifier` is `thesis-12`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{DsapsError, Result};

/// Column of the metadata CSV holding the file stem.
pub const FILE_IDENTIFIER_COLUMN: &str = "file_identifier";

pub const NO_METADATA_FILE: &str = "no_metadata.csv";
pub const NO_FILES_FILE: &str = "no_files.csv";
pub const METADATA_MATCHES_FILE: &str = "metadata_matches.csv";

/// Outcome of a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// File stems with no metadata row.
    pub no_metadata: Vec<String>,
    /// Metadata identifiers with no file.
    pub no_files: Vec<String>,
    /// Metadata identifiers that have a file, in CSV order.
    pub metadata_matches: Vec<String>,
}

/// Map of file stem to path for every `*.{extension}` file under `root`.
pub fn collect_files(root: &Path, extension: &str) -> Result<BTreeMap<String, PathBuf>> {
    if !root.is_dir() {
        return Err(DsapsError::FileNotFound(root.to_path_buf()));
    }
    let extension = extension.trim_start_matches('.');

    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if let Some(previous) = files.insert(stem.to_string(), path.to_path_buf()) {
                warn!("Duplicate file stem {}: {}", stem, previous.display());
            }
        }
    }
    Ok(files)
}

/// `file_identifier` values of a metadata CSV, in row order.
pub fn read_metadata_ids(metadata_csv: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(metadata_csv)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h == FILE_IDENTIFIER_COLUMN)
        .ok_or_else(|| DsapsError::Validation {
            field: FILE_IDENTIFIER_COLUMN.to_string(),
            message: format!("column missing from {}", metadata_csv.display()),
        })?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record?;
        ids.push(record.get(column).unwrap_or_default().to_string());
    }
    Ok(ids)
}

/// Compare metadata identifiers with file stems.
pub fn reconcile_ids(metadata_ids: &[String], file_ids: &BTreeSet<String>) -> Reconciliation {
    let metadata_set: BTreeSet<&String> = metadata_ids.iter().collect();

    let metadata_matches: Vec<String> = metadata_ids
        .iter()
        .filter(|id| file_ids.contains(*id))
        .cloned()
        .collect();
    let no_files: BTreeSet<String> = metadata_ids
        .iter()
        .filter(|id| !file_ids.contains(*id))
        .cloned()
        .collect();
    let no_metadata: Vec<String> = file_ids
        .iter()
        .filter(|id| !metadata_set.contains(id))
        .cloned()
        .collect();

    Reconciliation {
        no_metadata,
        no_files: no_files.into_iter().collect(),
        metadata_matches,
    }
}

/// Write a single-column `id` CSV.
pub fn write_id_list(path: &Path, ids: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["id"])?;
    for id in ids {
        writer.write_record([id])?;
    }
    writer.flush().map_err(|e| DsapsError::io_with_path(e, path))?;
    Ok(())
}

/// Reconcile `metadata_csv` with the `*.{extension}` files under `files_root`
/// and write the three report CSVs into `output_dir`.
pub fn reconcile(
    metadata_csv: &Path,
    files_root: &Path,
    extension: &str,
    output_dir: &Path,
) -> Result<Reconciliation> {
    let files = collect_files(files_root, extension)?;
    let metadata_ids = read_metadata_ids(metadata_csv)?;
    let file_ids: BTreeSet<String> = files.into_keys().collect();

    let result = reconcile_ids(&metadata_ids, &file_ids);

    std::fs::create_dir_all(output_dir).map_err(|e| DsapsError::io_with_path(e, output_dir))?;
    write_id_list(&output_dir.join(NO_METADATA_FILE), &result.no_metadata)?;
    write_id_list(&output_dir.join(NO_FILES_FILE), &result.no_files)?;
    write_id_list(&output_dir.join(METADATA_MATCHES_FILE), &result.metadata_matches)?;

    info!(
        "Reconciled {} metadata rows with {} files: {} matched, {} without files, \
         {} without metadata",
        metadata_ids.len(),
        file_ids.len(),
        result.metadata_matches.len(),
        result.no_files.len(),
        result.no_metadata.len()
    );
    Ok(result)
}
