//! Error types for the DSpace batch client.
//!
//! Errors fall into two groups. Fatal errors (authentication, pagination,
//! audit I/O) stop a run. Per-item failures never surface here; the mutation
//! executor folds them into audit records instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dsaps operations.
#[derive(Debug, Error)]
pub enum DsapsError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Session errors
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // Pagination errors
    #[error("Pagination failed at offset {offset}: {message}")]
    Pagination { offset: u32, message: String },

    // Repository lookups
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unexpected response from {endpoint}: {message}")]
    UnexpectedResponse { endpoint: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("CSV error: {message}")]
    Csv {
        message: String,
        #[source]
        source: Option<csv::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Run cancelled by user")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for dsaps operations.
pub type Result<T> = std::result::Result<T, DsapsError>;

// Conversion implementations for common error types

impl From<std::io::Error> for DsapsError {
    fn from(err: std::io::Error) -> Self {
        DsapsError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DsapsError {
    fn from(err: serde_json::Error) -> Self {
        DsapsError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<csv::Error> for DsapsError {
    fn from(err: csv::Error) -> Self {
        DsapsError::Csv {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<url::ParseError> for DsapsError {
    fn from(err: url::ParseError) -> Self {
        DsapsError::InvalidUrl {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for DsapsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DsapsError::Timeout(std::time::Duration::from_secs(0))
        } else {
            DsapsError::Network {
                message: err.to_string(),
                cause: err.url().map(|u| u.to_string()),
            }
        }
    }
}

impl DsapsError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DsapsError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry of an idempotent request.
    pub fn is_retryable(&self) -> bool {
        match self {
            DsapsError::Network { .. } | DsapsError::Timeout(_) => true,
            DsapsError::Http { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            DsapsError::Cancelled => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DsapsError::Pagination {
            offset: 400,
            message: "HTTP 502".into(),
        };
        assert_eq!(err.to_string(), "Pagination failed at offset 400: HTTP 502");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(DsapsError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(DsapsError::Http {
            status: 503,
            url: "https://example.org/rest/status".into()
        }
        .is_retryable());
        assert!(!DsapsError::Http {
            status: 404,
            url: "https://example.org/rest/handle/x".into()
        }
        .is_retryable());
        assert!(!DsapsError::Auth {
            message: "no cookie".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DsapsError::Cancelled.exit_code(), 130);
        assert_eq!(DsapsError::Other("boom".into()).exit_code(), 1);
    }
}
