//! In-memory DSpace repository for end-to-end tests.
//!
//! Answers the handful of REST endpoints the batch jobs use and keeps item
//! metadata as mutable state, so a search run after an edit sees the edit.

#![allow(dead_code)]

use async_trait::async_trait;
use dsaps_core::session::Query;
use dsaps_core::{ApiResponse, DsapsError, Result, Session};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct FakeItem {
    collection: String,
    handle: String,
    metadata: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeRepository {
    handles: HashMap<String, String>,
    communities: BTreeMap<String, Vec<String>>,
    items: Mutex<BTreeMap<String, FakeItem>>,
    requests: Mutex<Vec<Request>>,
    /// Metadata paths whose PUT answers 500.
    failing_puts: Vec<String>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_community(mut self, handle: &str, uuid: &str, collections: &[&str]) -> Self {
        self.handles.insert(handle.to_string(), uuid.to_string());
        self.communities.insert(
            uuid.to_string(),
            collections.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Add an item; `metadata` is a list of `(key, value)` pairs.
    pub fn with_item(self, uuid: &str, collection: &str, metadata: &[(&str, &str)]) -> Self {
        let entries = metadata
            .iter()
            .map(|(key, value)| {
                json!({
                    "key": key,
                    "value": value,
                    "language": null,
                    "schema": key.split('.').next().unwrap_or_default(),
                    "element": key.split('.').nth(1).unwrap_or_default(),
                    "qualifier": key.split('.').nth(2)
                })
            })
            .collect();
        self.items.lock().unwrap().insert(
            format!("/rest/items/{}", uuid),
            FakeItem {
                collection: collection.to_string(),
                handle: format!("1721.1/{}", uuid),
                metadata: entries,
            },
        );
        self
    }

    pub fn with_failing_put(mut self, uuid: &str) -> Self {
        self.failing_puts.push(format!("/rest/items/{}/metadata", uuid));
        self
    }

    /// Current metadata of an item as `(key, value)` pairs.
    pub fn metadata(&self, uuid: &str) -> Vec<(String, String)> {
        self.items
            .lock()
            .unwrap()
            .get(&format!("/rest/items/{}", uuid))
            .map(|item| {
                item.metadata
                    .iter()
                    .map(|e| {
                        (
                            e["key"].as_str().unwrap_or_default().to_string(),
                            e["value"].as_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn raw_metadata(&self, uuid: &str) -> Vec<Value> {
        self.items
            .lock()
            .unwrap()
            .get(&format!("/rest/items/{}", uuid))
            .map(|item| item.metadata.clone())
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn record(&self, method: &'static str, path: &str, query: &Query) {
        self.requests.lock().unwrap().push(Request {
            method,
            path: path.to_string(),
            query: query.to_vec(),
        });
    }

    fn filtered_items(&self, query: &Query) -> Value {
        let values = |name: &str| -> Vec<&str> {
            query
                .iter()
                .filter(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .collect()
        };
        let field = values("query_field[]").first().copied().unwrap_or("*");
        let operator = values("query_op[]").first().copied().unwrap_or("exists");
        let collections = values("collSel[]");
        let expand = values("expand").contains(&"metadata");
        let limit: usize = values("limit").first().and_then(|v| v.parse().ok()).unwrap_or(100);
        let offset: usize = values("offset").first().and_then(|v| v.parse().ok()).unwrap_or(0);
        assert_eq!(operator, "exists", "fake repository only supports exists");

        let items = self.items.lock().unwrap();
        let page: Vec<Value> = items
            .iter()
            .filter(|(_, item)| {
                collections.is_empty() || collections.contains(&item.collection.as_str())
            })
            .filter(|(_, item)| field == "*" || item.metadata.iter().any(|e| e["key"] == field))
            .skip(offset)
            .take(limit)
            .map(|(link, item)| {
                let mut summary = json!({"link": link, "handle": item.handle});
                if expand {
                    summary["metadata"] = Value::Array(item.metadata.clone());
                }
                summary
            })
            .collect();
        json!({ "items": page })
    }

    fn answer_get(&self, path: &str, query: &Query) -> ApiResponse {
        if path == "filtered-items" {
            return ApiResponse::new(200, self.filtered_items(query), path);
        }
        if path == "communities" {
            let list: Vec<Value> = self
                .communities
                .keys()
                .map(|uuid| json!({"uuid": uuid}))
                .collect();
            return ApiResponse::new(200, Value::Array(list), path);
        }
        if let Some(handle) = path.strip_prefix("handle/") {
            return match self.handles.get(handle) {
                Some(uuid) => {
                    ApiResponse::new(200, json!({"uuid": uuid, "type": "community"}), path)
                }
                None => ApiResponse::new(404, Value::Null, path),
            };
        }
        if let Some(rest) = path.strip_prefix("communities/") {
            if let Some(uuid) = rest.strip_suffix("/collections") {
                return match self.communities.get(uuid) {
                    Some(collections) => {
                        let list: Vec<Value> =
                            collections.iter().map(|c| json!({"uuid": c})).collect();
                        ApiResponse::new(200, Value::Array(list), path)
                    }
                    None => ApiResponse::new(404, Value::Null, path),
                };
            }
        }
        if let Some(link) = path.strip_suffix("/metadata") {
            if let Some(item) = self.items.lock().unwrap().get(link) {
                return ApiResponse::new(200, Value::Array(item.metadata.clone()), path);
            }
        }
        ApiResponse::new(404, Value::Null, path)
    }
}

#[async_trait]
impl Session for FakeRepository {
    async fn get(&self, path: &str, query: &Query) -> Result<ApiResponse> {
        self.record("GET", path, query);
        Ok(self.answer_get(path, query))
    }

    async fn post(&self, path: &str, query: &Query, _body: Option<&Value>) -> Result<ApiResponse> {
        self.record("POST", path, query);
        Ok(ApiResponse::new(405, Value::Null, path))
    }

    async fn post_bytes(&self, path: &str, query: &Query, _bytes: Vec<u8>) -> Result<ApiResponse> {
        self.record("POST", path, query);
        Ok(ApiResponse::new(405, Value::Null, path))
    }

    async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.record("PUT", path, &[]);
        if self.failing_puts.iter().any(|p| p == path) {
            return Ok(ApiResponse::new(500, Value::Null, path));
        }
        let Some(link) = path.strip_suffix("/metadata") else {
            return Ok(ApiResponse::new(404, Value::Null, path));
        };
        let mut items = self.items.lock().unwrap();
        match (items.get_mut(link), body.as_array()) {
            (Some(item), Some(entries)) => {
                item.metadata.extend(entries.iter().cloned());
                Ok(ApiResponse::new(200, Value::Null, path))
            }
            (None, _) => Ok(ApiResponse::new(404, Value::Null, path)),
            (_, None) => Ok(ApiResponse::new(400, Value::Null, path)),
        }
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.record("DELETE", path, &[]);
        let Some(link) = path.strip_suffix("/metadata") else {
            return Ok(ApiResponse::new(404, Value::Null, path));
        };
        match self.items.lock().unwrap().get_mut(link) {
            Some(item) => {
                item.metadata.clear();
                Ok(ApiResponse::new(200, Value::Null, path))
            }
            None => Ok(ApiResponse::new(404, Value::Null, path)),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.record("GET", url, &[]);
        Err(DsapsError::Http {
            status: 404,
            url: url.to_string(),
        })
    }

    async fn logout(&self) -> Result<()> {
        self.record("POST", "logout", &[]);
        Ok(())
    }
}
