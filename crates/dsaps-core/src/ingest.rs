//! Creating a collection from a metadata CSV.
//!
//! A JSON field map says which CSV column feeds which metadata key:
//!
//! ```json
//! {
//!   "dc.title": {"csv_field_name": "Title", "delimiter": "", "language": "en_US"},
//!   "dc.subject": {"csv_field_name": "Keywords", "delimiter": "|", "language": null},
//!   "item_identifier": {"csv_field_name": "file_identifier"}
//! }
//! ```
//!
//! Every row becomes one item; a `bitstreams` column holding a list literal
//! (`['a.pdf', 'b.pdf']`) names the files to upload with it. Each entry is a
//! local path or an `http(s)` URL.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{Bitstream, Item, MetadataEntry};
use crate::network::RetryConfig;
use crate::records::{created_uuid, get_uuid_from_handle};
use crate::session::Session;
use crate::{DsapsError, Result};

const ITEM_IDENTIFIER: &str = "item_identifier";
const SOURCE_SYSTEM_IDENTIFIER: &str = "source_system_identifier";
const BITSTREAMS_COLUMN: &str = "bitstreams";

/// How one CSV column maps to a metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldMapping {
    pub csv_field_name: String,
    /// Splits a cell into several values. Empty means no splitting.
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl FieldMapping {
    fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref().filter(|d| !d.is_empty())
    }

    fn language(&self) -> Option<&str> {
        self.language.as_deref().filter(|l| !l.is_empty())
    }
}

/// Metadata keys and identifiers mapped to CSV columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: BTreeMap<String, FieldMapping>,
    item_identifier: Option<FieldMapping>,
    source_system_identifier: Option<FieldMapping>,
}

impl FieldMap {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut fields: BTreeMap<String, FieldMapping> = serde_json::from_str(json)?;
        let item_identifier = fields.remove(ITEM_IDENTIFIER);
        let source_system_identifier = fields.remove(SOURCE_SYSTEM_IDENTIFIER);
        Ok(Self {
            fields,
            item_identifier,
            source_system_identifier,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DsapsError::FileNotFound(path.to_path_buf()));
        }
        let json =
            std::fs::read_to_string(path).map_err(|e| DsapsError::io_with_path(e, path))?;
        Self::from_json_str(&json)
    }

    /// Mapped metadata keys, in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl Item {
    /// Build an unsaved item from one CSV row.
    pub fn from_csv_row(row: &HashMap<String, String>, map: &FieldMap) -> Result<Self> {
        let mut metadata = Vec::new();
        for (key, mapping) in &map.fields {
            let cell = row
                .get(&mapping.csv_field_name)
                .ok_or_else(|| DsapsError::Validation {
                    field: mapping.csv_field_name.clone(),
                    message: format!("column mapped to {} is missing from the CSV", key),
                })?;
            if cell.is_empty() {
                continue;
            }
            let language = mapping.language();
            match mapping.delimiter() {
                Some(delimiter) => metadata.extend(
                    cell.split(delimiter)
                        .map(|value| MetadataEntry::new(key.as_str(), value, language)),
                ),
                None => metadata.push(MetadataEntry::new(key.as_str(), cell.as_str(), language)),
            }
        }

        let identifier = |mapping: &Option<FieldMapping>| {
            mapping
                .as_ref()
                .and_then(|m| row.get(&m.csv_field_name))
                .cloned()
        };

        let bitstreams_cell = row
            .get(BITSTREAMS_COLUMN)
            .filter(|cell| !cell.trim().is_empty());
        let bitstreams = match bitstreams_cell {
            Some(cell) => parse_list_literal(cell)?
                .into_iter()
                .map(Bitstream::from_path)
                .collect(),
            None => Vec::new(),
        };

        Ok(Item {
            metadata,
            bitstreams,
            item_identifier: identifier(&map.item_identifier),
            source_system_identifier: identifier(&map.source_system_identifier),
            ..Item::default()
        })
    }
}

/// A collection to create, with the items to post into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCollection {
    pub name: String,
    pub items: Vec<Item>,
}

impl NewCollection {
    /// One item per CSV row.
    pub fn from_csv<R: Read>(
        name: impl Into<String>,
        reader: R,
        map: &FieldMap,
    ) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let mut items = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let row: HashMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            items.push(Item::from_csv_row(&row, map)?);
        }

        Ok(Self {
            name: name.into(),
            items,
        })
    }

    pub fn from_csv_path(name: impl Into<String>, path: &Path, map: &FieldMap) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| DsapsError::io_with_path(e, path))?;
        Self::from_csv(name, file, map)
    }

    /// Every item as the `{"metadata": [...]}` body it would be posted with.
    pub fn metadata_json(&self) -> Value {
        self.items.iter().map(item_body).collect()
    }
}

/// Body of `POST collections/{uuid}/items`.
fn item_body(item: &Item) -> Value {
    let metadata: Vec<Value> = item
        .metadata
        .iter()
        .map(|entry| json!({"key": entry.key, "value": entry.value, "language": entry.language}))
        .collect();
    json!({ "metadata": metadata })
}

/// Convert a metadata CSV into a JSON array of item bodies written to
/// `<output_dir>/<csv stem>.json`. Returns the written path.
pub fn write_metadata_json(
    metadata_csv: &Path,
    map: &FieldMap,
    output_dir: &Path,
) -> Result<PathBuf> {
    let stem = metadata_csv
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| DsapsError::Validation {
            field: "metadata_csv".to_string(),
            message: format!("{} has no file name", metadata_csv.display()),
        })?;
    let collection = NewCollection::from_csv_path(stem.clone(), metadata_csv, map)?;

    let output = output_dir.join(format!("{}.json", stem));
    let json = serde_json::to_string(&collection.metadata_json())?;
    std::fs::write(&output, json).map_err(|e| DsapsError::io_with_path(e, &output))?;
    info!(
        "Wrote metadata for {} items to {}",
        collection.items.len(),
        output.display()
    );
    Ok(output)
}

/// Parse a list literal such as `['a.pdf', "b.pdf"]`.
pub fn parse_list_literal(literal: &str) -> Result<Vec<String>> {
    let invalid = |message: &str| DsapsError::Validation {
        field: BITSTREAMS_COLUMN.to_string(),
        message: format!("{}: {}", message, literal),
    };

    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| invalid("expected a [..] list"))?;

    let mut values = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '\'' && quote != '"' {
            return Err(invalid("expected a quoted string"));
        }

        let mut value = String::new();
        loop {
            match chars.next() {
                Some('\\') => match chars.next() {
                    Some(escaped) => value.push(escaped),
                    None => return Err(invalid("dangling escape")),
                },
                Some(c) if c == quote => break,
                Some(c) => value.push(c),
                None => return Err(invalid("unterminated string")),
            }
        }
        values.push(value);
    }
    Ok(values)
}

/// Create a collection named `coll_name` under the community with
/// `comm_handle`. Returns the new collection's UUID.
pub async fn post_collection_to_community<S>(
    session: &S,
    comm_handle: &str,
    coll_name: &str,
) -> Result<String>
where
    S: Session + ?Sized,
{
    let community_uuid =
        get_uuid_from_handle(session, comm_handle, &RetryConfig::default()).await?;
    let path = format!("communities/{}/collections", community_uuid);
    let response = session
        .post(&path, &[], Some(&json!({ "name": coll_name })))
        .await?
        .error_for_status()?;
    let uuid = created_uuid(&path, &response.body)?;
    info!("Collection posted: {}", uuid);
    Ok(uuid)
}

/// Post an item's metadata into a collection. Returns `(uuid, handle)`.
pub async fn post_item_to_collection<S>(
    session: &S,
    collection_uuid: &str,
    item: &Item,
) -> Result<(String, String)>
where
    S: Session + ?Sized,
{
    let path = format!("collections/{}/items", collection_uuid);
    let response = session
        .post(&path, &[], Some(&item_body(item)))
        .await?
        .error_for_status()?;
    debug!("Item POST response: {}", response.body);

    let uuid = created_uuid(&path, &response.body)?;
    let handle = response
        .body
        .get("handle")
        .and_then(|h| h.as_str())
        .unwrap_or_default()
        .to_string();
    Ok((uuid, handle))
}

/// Upload a bitstream's file to an item. Returns the bitstream UUID.
///
/// `http(s)` sources are downloaded first; anything else is read from disk.
pub async fn post_bitstream<S>(
    session: &S,
    item_uuid: &str,
    bitstream: &Bitstream,
) -> Result<String>
where
    S: Session + ?Sized,
{
    let file_path = bitstream.file_path.as_deref().ok_or_else(|| DsapsError::Validation {
        field: "file_path".to_string(),
        message: "bitstream has no source file".to_string(),
    })?;
    let name = bitstream.name.clone().unwrap_or_else(|| {
        file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let bytes = match bitstream.remote_url() {
        Some(url) => session.fetch_bytes(url).await?,
        None => tokio::fs::read(file_path)
            .await
            .map_err(|e| DsapsError::io_with_path(e, file_path))?,
    };
    let path = format!("items/{}/bitstreams", item_uuid);
    let response = session
        .post_bytes(&path, &[("name".to_string(), name)], bytes)
        .await?
        .error_for_status()?;
    debug!("Bitstream POST response: {}", response.body);
    created_uuid(&path, &response.body)
}

/// What an ingest created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub collection_uuid: String,
    /// `(uuid, handle)` of each posted item, in CSV order.
    pub items: Vec<(String, String)>,
    pub bitstreams: usize,
}

/// Create the collection and post every item with its bitstreams.
pub async fn ingest_collection<S>(
    session: &S,
    comm_handle: &str,
    collection: &NewCollection,
) -> Result<IngestReport>
where
    S: Session + ?Sized,
{
    let collection_uuid =
        post_collection_to_community(session, comm_handle, &collection.name).await?;
    let mut report = IngestReport {
        collection_uuid: collection_uuid.clone(),
        ..IngestReport::default()
    };

    for item in &collection.items {
        let (item_uuid, handle) = post_item_to_collection(session, &collection_uuid, item).await?;
        for bitstream in &item.bitstreams {
            let bitstream_uuid = post_bitstream(session, &item_uuid, bitstream).await?;
            debug!("Bitstream {} posted to {}", bitstream_uuid, item_uuid);
            report.bitstreams += 1;
        }
        info!("Item posted: {} {}", item_uuid, handle);
        report.items.push((item_uuid, handle));
    }

    Ok(report)
}
