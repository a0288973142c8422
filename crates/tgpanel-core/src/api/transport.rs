use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Transport-neutral outgoing request, as seen by middleware.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, kept for logging.
    pub path: String,
    /// Absolute URL the transport should hit.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
    /// Set by the timing middleware.
    pub started_at: Option<Instant>,
}

impl ApiRequest {
    pub fn new(method: Method, base_url: &str, path: &str, timeout: Duration) -> Self {
        Self {
            method,
            path: path.to_string(),
            url: format!("{base_url}{path}"),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: None,
            timeout,
            started_at: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Insert or replace a header (names compare case-insensitively).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// Time since the timing middleware stamped the request.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}

/// Response as received from the wire, before normalisation.
#[derive(Clone, Debug, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body as JSON, `null` when empty.
    pub fn json_value(&self) -> Option<serde_json::Value> {
        if self.body.trim().is_empty() {
            return Some(serde_json::Value::Null);
        }
        serde_json::from_str(&self.body).ok()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        if self.body.trim().is_empty() {
            return serde_json::from_str("null");
        }
        serde_json::from_str(&self.body)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Failure to obtain any response at all.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Unreachable(String),

    #[error("request failed: {0}")]
    Other(String),
}

/// Port for the HTTP wire. Implementations must not interpret status codes.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, req: &ApiRequest) -> Result<RawResponse, TransportError>;
}
