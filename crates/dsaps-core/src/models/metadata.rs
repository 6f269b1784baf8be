//! Item metadata entries.

use serde::{Deserialize, Serialize};

/// One `key`/`value`/`language` triple of an item's metadata.
///
/// The REST API also returns `schema`, `element` and `qualifier` for every
/// entry, but its write endpoints only accept the dotted `key` form, so those
/// fields are dropped on deserialization. A `null` value is kept as `None`
/// and written back as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            language: language.map(str::to_string),
        }
    }

    /// The value, with `null` read as the empty string.
    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}
