use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::transport::{RawResponse, TransportError};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection.";

/// Failure classes after response normalisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 401. The credential has already been cleared when callers see this.
    Unauthorized,
    /// 403.
    Forbidden,
    /// 429, see [`ApiError::retry_after`].
    RateLimited,
    /// 5xx.
    Server,
    /// No response: unreachable host, reset connection or timeout.
    Connectivity,
    /// Any other non-2xx status.
    Request,
    /// 2xx whose body did not match the expected shape.
    Decode,
}

/// The single failure shape every endpoint returns.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// HTTP status, `0` when no response was received.
    pub status: u16,
    pub message: String,
    pub details: Option<Value>,
    pub error_code: Option<String>,
    /// Seconds, from the `retry-after` header of a 429.
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, status: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            details: None,
            error_code: None,
            retry_after: None,
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Connectivity, 0, message)
    }

    pub fn from_transport(err: &TransportError) -> Self {
        let mut e = Self::connectivity(NETWORK_ERROR_MESSAGE);
        e.details = Some(Value::String(err.to_string()));
        e
    }

    pub fn decode(status: u16, err: impl fmt::Display) -> Self {
        Self::new(
            ApiErrorKind::Decode,
            status,
            format!("Unexpected response from server: {err}"),
        )
    }

    /// Classify a non-2xx response and pull the message out of its body.
    ///
    /// Message precedence: `error`, `message`, `detail`, then a generic
    /// status line.
    pub fn from_response(raw: &RawResponse) -> Self {
        let kind = kind_for_status(raw.status);
        let body = raw.json_value().unwrap_or(Value::Null);

        let string_field = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let message = string_field("error")
            .or_else(|| string_field("message"))
            .or_else(|| string_field("detail"))
            .unwrap_or_else(|| format!("Request failed with status code {}", raw.status));

        // FastAPI validation failures put a list under `detail`.
        let details = body
            .get("details")
            .cloned()
            .or_else(|| body.get("detail").filter(|d| !d.is_string()).cloned())
            .filter(|d| !d.is_null());

        let error_code = body.get("error_code").and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let retry_after = if kind == ApiErrorKind::RateLimited {
            raw.header("retry-after")
                .and_then(|v| parse_retry_after(v, Utc::now()))
        } else {
            None
        };

        Self {
            kind,
            status: raw.status,
            message,
            details,
            error_code,
            retry_after,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Unauthorized
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(secs) = self.retry_after {
            write!(f, " (retry after {secs}s)")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// `Retry-After` as seconds from `now`: either delta-seconds or an HTTP-date.
/// A date already past reads as zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some(at.signed_duration_since(now).num_seconds().max(0) as u64)
}

pub fn kind_for_status(status: u16) -> ApiErrorKind {
    match status {
        401 => ApiErrorKind::Unauthorized,
        403 => ApiErrorKind::Forbidden,
        429 => ApiErrorKind::RateLimited,
        500..=599 => ApiErrorKind::Server,
        _ => ApiErrorKind::Request,
    }
}
