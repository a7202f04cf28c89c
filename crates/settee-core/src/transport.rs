//! Transport layer
//!
//! The lifecycle code never builds HTTP requests itself. It talks to the
//! server through the [`Transport`] trait, which has an HTTP implementation
//! here and an in-memory one in [`crate::memory`].
//!
//! All locations are full URIs (`<server>/<database>/<escaped id>`), with
//! query strings already attached where needed.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// User agent sent with every request
const USER_AGENT: &str = concat!("settee/", env!("CARGO_PKG_VERSION"));

/// Server reply to a single document write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

/// Per-document outcome inside a bulk write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BulkItemResult {
    /// Check if the server accepted this document
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Blocking access to a document server
pub trait Transport {
    /// Read a document (or any JSON resource) at `location`
    fn get(&self, location: &str) -> StoreResult<Value>;

    /// Write `body` to `location`
    fn put(&self, location: &str, body: &Value) -> StoreResult<WriteResponse>;

    /// Delete the resource at `location` (revision-qualified)
    fn delete(&self, location: &str) -> StoreResult<Value>;

    /// Submit many documents and tombstones in a single request
    fn bulk_docs(&self, database_uri: &str, docs: &[Value]) -> StoreResult<Vec<BulkItemResult>>;

    /// Ask the server for `count` fresh unique ids
    fn uuids(&self, count: usize) -> StoreResult<Vec<String>>;
}

/// Error body returned by the server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct UuidsBody {
    uuids: Vec<String>,
}

/// [`Transport`] backed by a reqwest blocking client
pub struct HttpTransport {
    server_url: String,
    client: Client,
}

impl HttpTransport {
    /// Create a transport for the server at `server_url`
    pub fn new(server_url: &str, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Get the server URL
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn send(&self, location: &str, request: RequestBuilder) -> StoreResult<Value> {
        let response = request.send()?;
        let status = response.status();
        debug!("{} -> {}", location, status);

        if status.is_success() {
            return Ok(response.json()?);
        }

        Err(status_error(location, status, response))
    }
}

impl Transport for HttpTransport {
    fn get(&self, location: &str) -> StoreResult<Value> {
        self.send(location, self.client.get(location))
    }

    fn put(&self, location: &str, body: &Value) -> StoreResult<WriteResponse> {
        let value = self.send(location, self.client.put(location).json(body))?;
        Ok(serde_json::from_value(value)?)
    }

    fn delete(&self, location: &str) -> StoreResult<Value> {
        self.send(location, self.client.delete(location))
    }

    fn bulk_docs(&self, database_uri: &str, docs: &[Value]) -> StoreResult<Vec<BulkItemResult>> {
        let location = format!("{}/_bulk_docs", database_uri);
        let body = serde_json::json!({ "docs": docs });
        let value = self.send(&location, self.client.post(&location).json(&body))?;
        Ok(serde_json::from_value(value)?)
    }

    fn uuids(&self, count: usize) -> StoreResult<Vec<String>> {
        let location = format!("{}/_uuids?count={}", self.server_url, count);
        let value = self.send(&location, self.client.get(&location))?;
        let body: UuidsBody = serde_json::from_value(value)?;
        Ok(body.uuids)
    }
}

/// Map a non-success response onto a [`StoreError`]
fn status_error(location: &str, status: StatusCode, response: Response) -> StoreError {
    let body = response
        .json::<ErrorBody>()
        .map(|b| format!("{}: {}", b.error, b.reason))
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());

    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound {
            location: location.to_string(),
        },
        StatusCode::CONFLICT => StoreError::Conflict {
            location: location.to_string(),
            reason: body,
        },
        _ => StoreError::Transport {
            location: location.to_string(),
            status: Some(status.as_u16()),
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_url_trailing_slash() {
        let transport =
            HttpTransport::new("http://127.0.0.1:5984/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.server_url(), "http://127.0.0.1:5984");
    }

    #[test]
    fn test_bulk_item_result_parsing() {
        let json = r#"[
            {"ok": true, "id": "a", "rev": "1-abc"},
            {"id": "b", "error": "conflict", "reason": "Document update conflict."}
        ]"#;

        let results: Vec<BulkItemResult> = serde_json::from_str(json).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[0].rev.as_deref(), Some("1-abc"));
        assert!(!results[1].is_ok());
        assert_eq!(results[1].error.as_deref(), Some("conflict"));
    }

    #[test]
    fn test_write_response_parsing() {
        let json = r#"{"ok": true, "id": "doc", "rev": "2-def"}"#;
        let response: WriteResponse = serde_json::from_str(json).unwrap();
        assert!(response.ok);
        assert_eq!(response.id, "doc");
        assert_eq!(response.rev, "2-def");
    }

    #[test]
    fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let transport =
            HttpTransport::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = transport.get("http://127.0.0.1:9/db/doc").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
    }
}
