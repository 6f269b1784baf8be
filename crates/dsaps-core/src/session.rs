//! The `Session` capability every repository operation runs against.
//!
//! A session is an explicit value handed to each operation. The reqwest
//! implementation lives in [`crate::network::DSpaceSession`]; tests provide
//! in-memory fakes.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{DsapsError, Result};

/// Query string pairs. Keys may repeat (`collSel[]`).
pub type Query = [(String, String)];

/// A response the server produced, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body, `Value::Null` when the body was empty or not JSON.
    pub body: Value,
    /// Fully resolved request URL or path, for messages.
    pub url: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value, url: impl Into<String>) -> Self {
        Self {
            status,
            body,
            url: url.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx status into [`DsapsError::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DsapsError::Http {
                status: self.status,
                url: self.url,
            })
        }
    }

    /// Require success and deserialize the body.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let response = self.error_for_status()?;
        serde_json::from_value(response.body).map_err(|e| DsapsError::UnexpectedResponse {
            endpoint: response.url,
            message: e.to_string(),
        })
    }
}

/// Authenticated access to the DSpace REST API.
///
/// Paths are relative to the REST base (`filtered-items`, `handle/1721.1/1`)
/// or server-absolute links as returned by the API (`/rest/items/<uuid>`).
/// Implementations return `Ok` for every response the server produced,
/// including error statuses; `Err` means no usable response arrived.
#[async_trait]
pub trait Session: Send + Sync {
    async fn get(&self, path: &str, query: &Query) -> Result<ApiResponse>;

    async fn post(&self, path: &str, query: &Query, body: Option<&Value>) -> Result<ApiResponse>;

    /// POST a raw byte payload, used for bitstream uploads.
    async fn post_bytes(&self, path: &str, query: &Query, bytes: Vec<u8>) -> Result<ApiResponse>;

    async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse>;

    async fn delete(&self, path: &str) -> Result<ApiResponse>;

    /// Download a file from an absolute `http(s)` URL outside the REST API,
    /// such as a remote bitstream source. A non-2xx status is an error.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;

    /// End the server-side session.
    async fn logout(&self) -> Result<()>;
}
