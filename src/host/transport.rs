//! Transport Layer
//!
//! Abstracts the connection to the orchestration service for testability:
//! - Transport trait: request/upload/download primitives
//! - HttpTransport (see `http`): blocking HTTP client for production
//! - MockService (see `crate::mock`): in-process fake service for tests

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// HTTP-style request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport trait for service communication
pub trait Transport: Send + Sync {
    /// Send a JSON request and return the JSON response
    fn request(&self, method: Method, path: &str, params: &Value) -> Result<Value, TransportError>;

    /// Upload a binary blob alongside `params`; the response carries a file reference
    fn upload(&self, path: &str, params: &Value, content: &[u8]) -> Result<Value, TransportError>;

    /// Download a remote file tree into `dest` and return the local path
    fn download(
        &self,
        method: Method,
        path: &str,
        params: &Value,
        dest: &Path,
    ) -> Result<PathBuf, TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Service error: {0}")]
    Service(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::ConnectionFailed(_) | TransportError::Timeout(_) => true,
            TransportError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Convert a JSON object into string form fields (used for multipart uploads)
pub fn form_fields(params: &Value) -> Vec<(String, String)> {
    match params {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Fail with `Service` if the response carries a top-level `error` field
pub fn check_service_error(value: Value) -> Result<Value, TransportError> {
    match value.get("error") {
        Some(Value::String(message)) => Err(TransportError::Service(message.clone())),
        Some(Value::Null) | None => Ok(value),
        Some(other) => Err(TransportError::Service(other.to_string())),
    }
}
