//! Metadata rewrite that removes one key and leaves a provenance note.
//!
//! The rewrite is a pure function of the current entries, the key and a
//! timestamp, which keeps it testable without a server.

use chrono::NaiveDateTime;

use crate::config::ProvenanceConfig;
use crate::models::MetadataEntry;

/// How many provenance notes a rewrite leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvenanceMode {
    /// One note per item, at the position of the first removed entry.
    #[default]
    OncePerItem,
    /// One note in place of every removed entry.
    PerMatch,
}

/// Removes every entry with a given key, leaving a provenance note.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataTransformer {
    mode: ProvenanceMode,
}

impl MetadataTransformer {
    pub fn new(mode: ProvenanceMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ProvenanceMode {
        self.mode
    }

    /// Rewrite `entries` without `target_key`.
    ///
    /// Entries with other keys keep their relative order. When nothing
    /// matches, the output equals the input.
    pub fn transform(
        &self,
        entries: &[MetadataEntry],
        target_key: &str,
        now: NaiveDateTime,
    ) -> Vec<MetadataEntry> {
        let mut output = Vec::with_capacity(entries.len());
        let mut noted = false;

        for entry in entries {
            if entry.key != target_key {
                output.push(entry.clone());
                continue;
            }
            if !noted || self.mode == ProvenanceMode::PerMatch {
                output.push(provenance_entry(target_key, now));
                noted = true;
            }
        }

        output
    }
}

/// Number of entries carrying `key`.
pub fn count_matches(entries: &[MetadataEntry], key: &str) -> usize {
    entries.iter().filter(|entry| entry.key == key).count()
}

/// The note recorded when `deleted_key` is removed at `now`.
pub fn provenance_entry(deleted_key: &str, now: NaiveDateTime) -> MetadataEntry {
    MetadataEntry::new(
        ProvenanceConfig::KEY,
        format!(
            "'{}' was deleted through a batch process on {}.",
            deleted_key,
            now.format(ProvenanceConfig::TIMESTAMP_FORMAT)
        ),
        Some(ProvenanceConfig::LANGUAGE),
    )
}
