//! Filtered-item search types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::MetadataEntry;
use crate::DsapsError;

/// Comparison operators understood by the `filtered-items` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperator {
    Exists,
    DoesntExist,
    Equals,
    NotEquals,
    Contains,
    DoesntContain,
}

impl QueryOperator {
    pub const ALL: [QueryOperator; 6] = [
        QueryOperator::Exists,
        QueryOperator::DoesntExist,
        QueryOperator::Equals,
        QueryOperator::NotEquals,
        QueryOperator::Contains,
        QueryOperator::DoesntContain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOperator::Exists => "exists",
            QueryOperator::DoesntExist => "doesnt_exist",
            QueryOperator::Equals => "equals",
            QueryOperator::NotEquals => "not_equals",
            QueryOperator::Contains => "contains",
            QueryOperator::DoesntContain => "doesnt_contain",
        }
    }

    /// Whether the operator compares against a value at all.
    pub fn takes_value(&self) -> bool {
        !matches!(self, QueryOperator::Exists | QueryOperator::DoesntExist)
    }
}

impl FromStr for QueryOperator {
    type Err = DsapsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|op| op.as_str()).collect();
                DsapsError::Validation {
                    field: "search type".to_string(),
                    message: format!("unknown '{}' (expected one of {})", s, known.join(", ")),
                }
            })
    }
}

impl std::fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single `field operator value` predicate over item metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPredicate {
    /// Dotted metadata key, or `*` for any field.
    pub field: String,
    pub operator: QueryOperator,
    pub value: String,
}

impl SearchPredicate {
    pub fn new(
        field: impl Into<String>,
        operator: QueryOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Items that carry at least one value for `field`.
    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, QueryOperator::Exists, "")
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("query_field[]".to_string(), self.field.clone()),
            ("query_op[]".to_string(), self.operator.as_str().to_string()),
            ("query_val[]".to_string(), self.value.clone()),
        ]
    }
}

/// Collections a search is restricted to. Empty means the whole repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionScope {
    collection_ids: Vec<String>,
}

impl CollectionScope {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn new(collection_ids: impl IntoIterator<Item = String>) -> Self {
        let mut ids: Vec<String> = Vec::new();
        for id in collection_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Self { collection_ids: ids }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.collection_ids.is_empty()
    }

    pub fn collection_ids(&self) -> &[String] {
        &self.collection_ids
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.collection_ids
            .iter()
            .map(|id| ("collSel[]".to_string(), id.clone()))
            .collect()
    }
}

/// Opaque reference to one item, as returned in a search result's `link`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemReference(String);

impl ItemReference {
    pub fn new(link: impl Into<String>) -> Self {
        Self(link.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the item's metadata endpoint.
    pub fn metadata_path(&self) -> String {
        format!("{}/metadata", self.0.trim_end_matches('/'))
    }
}

impl std::fmt::Display for ItemReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a `filtered-items` page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredItem {
    pub link: String,
    #[serde(default)]
    pub handle: Option<String>,
    /// Present only when the search asked for `expand=metadata`.
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

impl FilteredItem {
    pub fn reference(&self) -> ItemReference {
        ItemReference::new(self.link.clone())
    }

    /// Last `dc.identifier.uri` value, the persistent handle URL of the item.
    pub fn identifier_uri(&self) -> Option<&str> {
        self.metadata
            .iter()
            .rev()
            .find(|entry| entry.key == "dc.identifier.uri")
            .map(MetadataEntry::value_str)
    }
}

/// Body of a `filtered-items` response.
#[derive(Debug, Clone, Deserialize)]
pub struct FilteredItemsPage {
    #[serde(default)]
    pub items: Vec<FilteredItem>,
}
