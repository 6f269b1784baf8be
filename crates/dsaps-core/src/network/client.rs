//! reqwest-backed DSpace REST session.
//!
//! Provides:
//! - `JSESSIONID` cookie login and logout
//! - Path resolution against the REST base URL
//! - JSON in/out with every response status surfaced to the caller
//! - A per-request timeout on every call

use crate::config::{ClientConfig, NetworkConfig};
use crate::session::{ApiResponse, Query, Session};
use crate::{DsapsError, Result};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Body of `GET status`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    authenticated: Option<bool>,
    #[serde(default)]
    fullname: Option<String>,
}

/// An authenticated session against one DSpace REST API.
pub struct DSpaceSession {
    client: Client,
    base_url: Url,
    cookie: String,
    user_full_name: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for DSpaceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DSpaceSession")
            .field("base_url", &self.base_url.as_str())
            .field("user_full_name", &self.user_full_name)
            .finish_non_exhaustive()
    }
}

impl DSpaceSession {
    /// Log in with email and password and confirm the session via `status`.
    pub async fn login(config: &ClientConfig, email: &str, password: &str) -> Result<Self> {
        let base_url = config.parsed_base_url()?;
        let client = build_client(config)?;
        let login_url = base_url.join("login")?;

        info!("Logging in to {}", base_url);
        let response = client
            .post(login_url.clone())
            .header(header::ACCEPT, "application/json")
            .query(&[("email", email), ("password", password)])
            .send()
            .await
            .map_err(|e| DsapsError::Auth {
                message: format!("POST {} failed: {}", login_url, e),
            })?;

        if !response.status().is_success() {
            return Err(DsapsError::Auth {
                message: format!("login returned {}", response.status()),
            });
        }

        let cookie = response
            .cookies()
            .find(|c| c.name() == NetworkConfig::SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| DsapsError::Auth {
                message: format!(
                    "login response carried no {} cookie",
                    NetworkConfig::SESSION_COOKIE
                ),
            })?;

        let mut session = Self {
            client,
            base_url,
            cookie,
            user_full_name: None,
            timeout: config.timeout,
        };

        let status: StatusResponse = session
            .get("status", &[])
            .await
            .and_then(ApiResponse::json)
            .map_err(|e| DsapsError::Auth {
                message: format!("status check failed: {}", e),
            })?;

        if status.authenticated == Some(false) {
            return Err(DsapsError::Auth {
                message: "server reports the session as unauthenticated".to_string(),
            });
        }

        session.user_full_name = status.fullname;
        info!(
            "Authenticated to {} as {}",
            session.base_url,
            session.user_full_name.as_deref().unwrap_or("unknown user")
        );
        Ok(session)
    }

    /// Resume a session from an existing `JSESSIONID` value.
    pub fn from_cookie(config: &ClientConfig, cookie: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.parsed_base_url()?,
            cookie: cookie.into(),
            user_full_name: None,
            timeout: config.timeout,
        })
    }

    pub fn user_full_name(&self) -> Option<&str> {
        self.user_full_name.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path or server-absolute link to a full URL.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).map_err(|e| DsapsError::InvalidUrl {
                url: path.to_string(),
                message: e.to_string(),
            });
        }
        self.base_url.join(path).map_err(|e| DsapsError::InvalidUrl {
            url: path.to_string(),
            message: e.to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(header::ACCEPT, "application/json")
            .header(
                header::COOKIE,
                format!("{}={}", NetworkConfig::SESSION_COOKIE, self.cookie),
            )
    }

    async fn send(&self, request: RequestBuilder, method: &str, url: &Url) -> Result<ApiResponse> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DsapsError::Timeout(self.timeout)
            } else {
                DsapsError::Network {
                    message: format!("{} {} failed: {}", method, url, e),
                    cause: Some(e.to_string()),
                }
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| DsapsError::Network {
            message: format!("{} {}: failed to read body: {}", method, url, e),
            cause: Some(e.to_string()),
        })?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| {
                debug!("{} {} returned a non-JSON body", method, url);
                Value::Null
            })
        };

        if !(200..300).contains(&status) {
            warn!("{} {} returned {}", method, url, status);
        } else {
            debug!("{} {} -> {}", method, url, status);
        }

        Ok(ApiResponse::new(status, body, url.as_str()))
    }
}

#[async_trait]
impl Session for DSpaceSession {
    async fn get(&self, path: &str, query: &Query) -> Result<ApiResponse> {
        let url = self.resolve(path)?;
        let request = self.request(reqwest::Method::GET, url.clone()).query(query);
        self.send(request, "GET", &url).await
    }

    async fn post(&self, path: &str, query: &Query, body: Option<&Value>) -> Result<ApiResponse> {
        let url = self.resolve(path)?;
        let mut request = self.request(reqwest::Method::POST, url.clone()).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request, "POST", &url).await
    }

    async fn post_bytes(&self, path: &str, query: &Query, bytes: Vec<u8>) -> Result<ApiResponse> {
        let url = self.resolve(path)?;
        let request = self
            .request(reqwest::Method::POST, url.clone())
            .query(query)
            .body(bytes);
        self.send(request, "POST", &url).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        let url = self.resolve(path)?;
        let request = self.request(reqwest::Method::PUT, url.clone()).json(body);
        self.send(request, "PUT", &url).await
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse> {
        let url = self.resolve(path)?;
        let request = self.request(reqwest::Method::DELETE, url.clone());
        self.send(request, "DELETE", &url).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let url = Url::parse(url).map_err(|e| DsapsError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        // Remote sources are not part of the repository; no session cookie.
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                DsapsError::Timeout(self.timeout)
            } else {
                DsapsError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    cause: Some(e.to_string()),
                }
            }
        })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            warn!("GET {} returned {}", url, status);
            return Err(DsapsError::Http {
                status,
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().await.map_err(|e| DsapsError::Network {
            message: format!("GET {}: failed to read body: {}", url, e),
            cause: Some(e.to_string()),
        })?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn logout(&self) -> Result<()> {
        let response = self.post("logout", &[], None).await?;
        if !response.is_success() {
            warn!("Logout returned {}", response.status);
        } else {
            info!("Logged out of {}", self.base_url);
        }
        Ok(())
    }
}

fn build_client(config: &ClientConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.as_str())
        .danger_accept_invalid_certs(!config.verify_tls)
        .build()
        .map_err(|e| DsapsError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            cause: None,
        })
}
