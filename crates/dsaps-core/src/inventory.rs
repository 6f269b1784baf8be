//! Inventory of every metadata value in the repository.
//!
//! Each collection is paged with metadata expanded. Every value except
//! provenance notes is appended to `completeValueLists<ts>/<key>ValuesComplete.csv`
//! next to the item's handle URI; once all collections are done,
//! `uniqueValueLists<ts>/<key>ValuesUnique.csv` lists each distinct value
//! with its count.

use chrono::NaiveDateTime;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::config::{AuditConfig, ProvenanceConfig};
use crate::models::{CollectionScope, FilteredItem, SearchPredicate};
use crate::network::RetryConfig;
use crate::orchestrator::format_elapsed;
use crate::pagination::Paginator;
use crate::records::{community_collections, list_communities};
use crate::session::Session;
use crate::{DsapsError, Result};

const COMPLETE_DIR_PREFIX: &str = "completeValueLists";
const UNIQUE_DIR_PREFIX: &str = "uniqueValueLists";
const COMPLETE_SUFFIX: &str = "ValuesComplete.csv";
const UNIQUE_SUFFIX: &str = "ValuesUnique.csv";

#[derive(Debug, Clone, Default)]
pub struct InventoryOptions {
    /// Collection UUIDs left out of the inventory.
    pub skip_collections: Vec<String>,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryReport {
    pub collections: usize,
    pub items: usize,
    pub keys: usize,
    pub complete_dir: PathBuf,
    pub unique_dir: PathBuf,
}

/// UUIDs of every collection of every community, minus `skip`.
pub async fn inventory_collections<S>(
    session: &S,
    skip: &[String],
    retry: &RetryConfig,
) -> Result<Vec<String>>
where
    S: Session + ?Sized,
{
    let mut collection_ids: Vec<String> = Vec::new();
    for community in list_communities(session, retry).await? {
        let Some(community_uuid) = community.uuid else {
            continue;
        };
        for collection in community_collections(session, &community_uuid, retry).await? {
            if !skip.contains(&collection) && !collection_ids.contains(&collection) {
                collection_ids.push(collection);
            }
        }
    }
    Ok(collection_ids)
}

/// Distinct values of one key, in first-seen order.
#[derive(Debug, Default)]
struct ValueCounts {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl ValueCounts {
    fn add(&mut self, value: &str) {
        match self.counts.get_mut(value) {
            Some(count) => *count += 1,
            None => {
                self.order.push(value.to_string());
                self.counts.insert(value.to_string(), 1);
            }
        }
    }
}

/// Per-key value lists under construction.
struct ValueLists {
    complete_dir: PathBuf,
    writers: HashMap<String, csv::Writer<File>>,
    counts: HashMap<String, ValueCounts>,
}

impl ValueLists {
    fn new(complete_dir: PathBuf) -> Self {
        Self {
            complete_dir,
            writers: HashMap::new(),
            counts: HashMap::new(),
        }
    }

    fn add_item(&mut self, item: &FilteredItem) -> Result<()> {
        let uri = item.identifier_uri().unwrap_or_default().to_string();
        for entry in &item.metadata {
            if entry.key == ProvenanceConfig::KEY {
                continue;
            }
            self.writer(&entry.key)?
                .write_record([uri.as_str(), entry.value_str()])?;
            self.counts
                .entry(entry.key.clone())
                .or_default()
                .add(entry.value_str());
        }
        Ok(())
    }

    fn writer(&mut self, key: &str) -> Result<&mut csv::Writer<File>> {
        if !self.writers.contains_key(key) {
            let path = self.complete_dir.join(format!("{}{}", key, COMPLETE_SUFFIX));
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| DsapsError::io_with_path(e, &path))?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(["handle", "value"])?;
            debug!("Started {}", path.display());
            self.writers.insert(key.to_string(), writer);
        }
        self.writers
            .get_mut(key)
            .ok_or_else(|| DsapsError::Other(format!("no writer for {}", key)))
    }

    fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Write the unique-value files; returns the number of keys.
    fn finish(mut self, unique_dir: &Path) -> Result<usize> {
        self.flush()?;
        for (key, values) in &self.counts {
            let path = unique_dir.join(format!("{}{}", key, UNIQUE_SUFFIX));
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["value", "count"])?;
            for value in &values.order {
                let count = values.counts.get(value).copied().unwrap_or_default();
                writer.write_record([value.clone(), format!("{:06}", count)])?;
            }
            writer.flush().map_err(|e| DsapsError::io_with_path(e, &path))?;
        }
        Ok(self.counts.len())
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| DsapsError::io_with_path(e, path))
}

/// Build the complete and unique value lists under `output_dir`.
pub async fn run_inventory<S>(
    session: &S,
    output_dir: &Path,
    started: NaiveDateTime,
    options: &InventoryOptions,
    cancel: &CancellationToken,
) -> Result<InventoryReport>
where
    S: Session + ?Sized,
{
    let run_start = Instant::now();
    let stamp = started.format(AuditConfig::FILE_TIMESTAMP_FORMAT).to_string();
    let complete_dir = output_dir.join(format!("{}{}", COMPLETE_DIR_PREFIX, stamp));
    let unique_dir = output_dir.join(format!("{}{}", UNIQUE_DIR_PREFIX, stamp));

    let collection_ids =
        inventory_collections(session, &options.skip_collections, &options.retry).await?;
    info!("Inventory of {} collections", collection_ids.len());

    create_dir(&complete_dir)?;
    create_dir(&unique_dir)?;

    let mut lists = ValueLists::new(complete_dir.clone());
    let mut items = 0;
    for (number, collection_id) in collection_ids.iter().enumerate() {
        cancel.check()?;
        info!(
            "{} Collections remaining: {}",
            collection_id,
            collection_ids.len() - number
        );

        let collection_start = Instant::now();
        let paginator = Paginator::new(
            SearchPredicate::exists("*"),
            CollectionScope::new([collection_id.clone()]),
        )
        .with_expanded_metadata()
        .with_retry(options.retry.clone());

        let mut pages = Box::pin(paginator.pages(session));
        while let Some(page) = pages.try_next().await? {
            for item in &page {
                lists.add_item(item)?;
            }
            items += page.len();
            lists.flush()?;
        }
        info!(
            "Collection {} done in {}",
            collection_id,
            format_elapsed(collection_start.elapsed())
        );
    }

    let keys = lists.finish(&unique_dir)?;
    info!(
        "Value lists for {} keys from {} items written in {}",
        keys,
        items,
        format_elapsed(run_start.elapsed())
    );

    Ok(InventoryReport {
        collections: collection_ids.len(),
        items,
        keys,
        complete_dir,
        unique_dir,
    })
}
