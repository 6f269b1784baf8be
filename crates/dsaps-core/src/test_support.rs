//! Scripted `Session` double for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::session::{ApiResponse, Query, Session};
use crate::{DsapsError, Result};

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RecordedCall {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

type Scripted = std::result::Result<ApiResponse, String>;

/// Answers each (method, path) from a FIFO of scripted responses.
///
/// Unscripted GETs answer 404; unscripted writes answer 200.
#[derive(Default)]
pub(crate) struct ScriptedSession {
    responses: Mutex<HashMap<(&'static str, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, method: &'static str, path: &str, status: u16, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Ok(ApiResponse::new(status, body, path)));
    }

    pub fn push_get(&self, path: &str, status: u16, body: Value) {
        self.push("GET", path, status, body);
    }

    /// Script a transport failure (no response at all).
    pub fn push_transport_error(&self, method: &'static str, path: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }

    pub fn get_count(&self, path: &str) -> usize {
        self.calls_to("GET", path).len()
    }

    fn answer(
        &self,
        method: &'static str,
        path: &str,
        query: &Query,
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            query: query.to_vec(),
            body,
        });

        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&(method, path.to_string()))
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(DsapsError::Network {
                message,
                cause: None,
            }),
            None if method == "GET" => Ok(ApiResponse::new(404, Value::Null, path)),
            None => Ok(ApiResponse::new(200, Value::Null, path)),
        }
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn get(&self, path: &str, query: &Query) -> Result<ApiResponse> {
        self.answer("GET", path, query, None)
    }

    async fn post(&self, path: &str, query: &Query, body: Option<&Value>) -> Result<ApiResponse> {
        self.answer("POST", path, query, body.cloned())
    }

    async fn post_bytes(&self, path: &str, query: &Query, bytes: Vec<u8>) -> Result<ApiResponse> {
        let body = Value::String(String::from_utf8_lossy(&bytes).into_owned());
        self.answer("POST", path, query, Some(body))
    }

    async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.answer("PUT", path, &[], Some(body.clone()))
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.answer("DELETE", path, &[], None)
    }

    /// Scripted under `("GET", url)`; a string body becomes the bytes.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.answer("GET", url, &[], None)?.error_for_status()?;
        Ok(match response.body {
            Value::String(text) => text.into_bytes(),
            other => other.to_string().into_bytes(),
        })
    }

    async fn logout(&self) -> Result<()> {
        self.answer("POST", "logout", &[], None).map(|_| ())
    }
}
