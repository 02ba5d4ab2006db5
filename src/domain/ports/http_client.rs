//! Outbound HTTP port.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::TransportError;

/// Outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Upper-case HTTP method.
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Headers, already filtered.
    pub headers: Vec<(String, String)>,
    /// Serialized body; the matching `content-type` travels in `headers`.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body.
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body parsed as JSON, `None` when it is not JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Sends HTTP requests. Non-2xx responses are returned, not raised;
/// only connection-level failures are errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request`, failing only when no response arrives.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
