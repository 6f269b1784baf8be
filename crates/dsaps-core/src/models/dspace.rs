//! Repository entities: communities, collections, items and bitstreams.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use super::MetadataEntry;

/// Kinds of record retrievable by UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Community,
    Collection,
    Item,
}

impl RecordType {
    /// REST path segment for this record type.
    pub fn endpoint(&self) -> &'static str {
        match self {
            RecordType::Community => "communities",
            RecordType::Collection => "collections",
            RecordType::Item => "items",
        }
    }
}

/// Fields shared by every DSpace object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DSpaceObject {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
}

/// A file attached (or to be attached) to an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitstream {
    #[serde(default)]
    pub name: Option<String>,
    /// Source for ingest: a local path or an `http(s)` URL. Never sent by
    /// the server.
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

impl Bitstream {
    /// Bitstream named after the last segment of its source path.
    pub fn from_path(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let name = file_path
            .to_string_lossy()
            .rsplit('/')
            .next()
            .map(str::to_string);
        Self {
            name,
            file_path: Some(file_path),
        }
    }

    /// The source URL when the bitstream is fetched over `http(s)`.
    pub fn remote_url(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .and_then(|path| path.to_str())
            .filter(|source| source.starts_with("http://") || source.starts_with("https://"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(flatten)]
    pub object: DSpaceObject,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default)]
    pub bitstreams: Vec<Bitstream>,
    #[serde(skip)]
    pub item_identifier: Option<String>,
    #[serde(skip)]
    pub source_system_identifier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(flatten)]
    pub object: DSpaceObject,
    /// UUIDs of the items in the collection (with `expand=items`).
    #[serde(default, deserialize_with = "uuid_list")]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    #[serde(flatten)]
    pub object: DSpaceObject,
    /// UUIDs of the community's collections (with `expand=collections`).
    #[serde(default, deserialize_with = "uuid_list")]
    pub collections: Vec<String>,
}

/// A record fetched by UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DSpaceRecord {
    Community(Community),
    Collection(Collection),
    Item(Item),
}

impl DSpaceRecord {
    pub fn object(&self) -> &DSpaceObject {
        match self {
            DSpaceRecord::Community(c) => &c.object,
            DSpaceRecord::Collection(c) => &c.object,
            DSpaceRecord::Item(i) => &i.object,
        }
    }
}

#[derive(Deserialize)]
struct ChildRef {
    #[serde(default)]
    uuid: Option<String>,
}

/// Reduce an expanded child array to the children's UUIDs.
fn uuid_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let children = Option::<Vec<ChildRef>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(children.into_iter().filter_map(|c| c.uuid).collect())
}
