//! HTTP transport for production use
//!
//! Talks to the orchestration service with a blocking reqwest client. Every
//! method carries a JSON body and uploads are multipart.
//!
//! Archive format: executable uploads are the uncompressed tar produced by
//! [`crate::bundle::Archiver`], sent as `executable.tar`, and result
//! downloads are expected back as tar streams. Deployments whose file
//! endpoint only accepts zip need a zip-producing archiver on both ends.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use super::transport::{check_service_error, form_fields, Method, Transport, TransportError};

/// File name attached to uploaded archives; the extension names the format
const UPLOAD_FILE_NAME: &str = "executable.tar";

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Service base URL, e.g. `https://compute.example.org`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3030".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Blocking HTTP transport
///
/// Archives cross this boundary as uncompressed tar in both directions:
/// `upload` sends the bytes it is given under the file name `executable.tar`,
/// and `download` unpacks the response body as tar into the destination.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };
        self.client.request(method, self.url(path))
    }
}

impl Transport for HttpTransport {
    fn request(&self, method: Method, path: &str, params: &Value) -> Result<Value, TransportError> {
        debug!(%method, path, "service request");
        let response = self
            .builder(method, path)
            .json(params)
            .send()
            .map_err(map_reqwest_error)?;
        read_json(response)
    }

    fn upload(&self, path: &str, params: &Value, content: &[u8]) -> Result<Value, TransportError> {
        debug!(path, bytes = content.len(), "service upload");
        let mut form = Form::new();
        for (key, value) in form_fields(params) {
            form = form.text(key, value);
        }
        let part = Part::bytes(content.to_vec()).file_name(UPLOAD_FILE_NAME);
        form = form.part("file", part);

        let response = self
            .builder(Method::Post, path)
            .multipart(form)
            .send()
            .map_err(map_reqwest_error)?;
        read_json(response)
    }

    fn download(
        &self,
        method: Method,
        path: &str,
        params: &Value,
        dest: &Path,
    ) -> Result<PathBuf, TransportError> {
        debug!(%method, path, dest = %dest.display(), "service download");
        let response = self
            .builder(method, path)
            .json(params)
            .send()
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response)?;
        let bytes = response.bytes().map_err(map_reqwest_error)?;

        unpack_archive(&bytes, dest)?;
        Ok(dest.to_path_buf())
    }
}

/// Unpack a tar result stream into `dest`
fn unpack_archive(bytes: &[u8], dest: &Path) -> Result<(), TransportError> {
    fs::create_dir_all(dest)?;
    tar::Archive::new(Cursor::new(bytes)).unpack(dest)?;
    Ok(())
}

fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    Err(TransportError::Http {
        status: status.as_u16(),
        message,
    })
}

fn read_json(response: Response) -> Result<Value, TransportError> {
    let response = ensure_success(response)?;
    let text = response.text().map_err(map_reqwest_error)?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| TransportError::Protocol(format!("Invalid response JSON: {}", e)))?;
    check_service_error(value)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::ConnectionFailed(err.to_string())
    } else if let Some(status) = err.status() {
        TransportError::Http {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else {
        TransportError::Protocol(err.to_string())
    }
}
