//! Request and response middleware applied by [`super::ApiClient`].
//!
//! Request middleware runs in list order before the transport; response
//! middleware folds over the transport result in list order. Each stage is a
//! plain value so it can be exercised without a client or a network.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::{token_store::TokenStore, utils::truncate_text};

use super::{
    error::{ApiError, ApiErrorKind, ApiResult},
    transport::{ApiRequest, RawResponse},
};

const LOG_BODY_MAX: usize = 500;

pub trait RequestMiddleware: Send + Sync {
    fn on_request(&self, req: &mut ApiRequest);
}

pub trait ResponseMiddleware: Send + Sync {
    fn on_response(&self, req: &ApiRequest, res: ApiResult<RawResponse>) -> ApiResult<RawResponse>;
}

/// Raised whenever any call comes back 401.
///
/// Holders of a receiver (the session, a UI loop) use it to force the login
/// view even when the 401 came from a call they did not make.
#[derive(Clone)]
pub struct UnauthorizedSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for UnauthorizedSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl UnauthorizedSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn raise(&self) {
        self.tx.send_modify(|n| *n += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Number of 401s seen so far.
    pub fn count(&self) -> u64 {
        *self.tx.borrow()
    }
}

/// Adds `Authorization: Bearer <token>` when the store holds a token.
pub struct BearerAuth {
    store: Arc<dyn TokenStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

impl RequestMiddleware for BearerAuth {
    fn on_request(&self, req: &mut ApiRequest) {
        if let Some(token) = self.store.token() {
            req.set_header("Authorization", format!("Bearer {token}"));
        }
    }
}

/// Stamps the request start time and logs the outgoing call.
pub struct RequestTimer {
    log_bodies: bool,
}

impl RequestTimer {
    pub fn new(log_bodies: bool) -> Self {
        Self { log_bodies }
    }
}

impl RequestMiddleware for RequestTimer {
    fn on_request(&self, req: &mut ApiRequest) {
        req.started_at = Some(Instant::now());
        if self.log_bodies {
            let body = req
                .body
                .as_ref()
                .map(|b| truncate_text(&redact(b).to_string(), LOG_BODY_MAX))
                .unwrap_or_default();
            tracing::debug!(method = req.method.as_str(), path = %req.path, %body, "api request");
        } else {
            tracing::debug!(method = req.method.as_str(), path = %req.path, "api request");
        }
    }
}

/// Turns non-2xx responses into [`ApiError`].
pub struct ErrorNormalizer;

impl ResponseMiddleware for ErrorNormalizer {
    fn on_response(&self, _req: &ApiRequest, res: ApiResult<RawResponse>) -> ApiResult<RawResponse> {
        match res {
            Ok(raw) if !raw.is_success() => Err(ApiError::from_response(&raw)),
            other => other,
        }
    }
}

/// On 401: clear the persisted credential and raise the signal.
pub struct UnauthorizedGuard {
    store: Arc<dyn TokenStore>,
    signal: UnauthorizedSignal,
}

impl UnauthorizedGuard {
    pub fn new(store: Arc<dyn TokenStore>, signal: UnauthorizedSignal) -> Self {
        Self { store, signal }
    }
}

impl ResponseMiddleware for UnauthorizedGuard {
    fn on_response(&self, req: &ApiRequest, res: ApiResult<RawResponse>) -> ApiResult<RawResponse> {
        if let Err(e) = &res {
            if e.is_unauthorized() {
                if let Err(err) = self.store.clear() {
                    tracing::warn!(error = %err, "failed to clear credential after 401");
                }
                tracing::info!(path = %req.path, "unauthorized; credential cleared");
                self.signal.raise();
            }
        }
        res
    }
}

/// Logs the outcome and duration of each call. Never alters the result.
pub struct ResponseLogger {
    log_bodies: bool,
}

impl ResponseLogger {
    pub fn new(log_bodies: bool) -> Self {
        Self { log_bodies }
    }
}

impl ResponseMiddleware for ResponseLogger {
    fn on_response(&self, req: &ApiRequest, res: ApiResult<RawResponse>) -> ApiResult<RawResponse> {
        let elapsed_ms = req.elapsed().map(|d| d.as_millis() as u64).unwrap_or(0);
        let method = req.method.as_str();

        match &res {
            Ok(raw) if self.log_bodies => {
                let body = truncate_text(&raw.body, LOG_BODY_MAX);
                tracing::debug!(method, path = %req.path, status = raw.status, elapsed_ms, %body, "api response");
            }
            Ok(raw) => {
                tracing::debug!(method, path = %req.path, status = raw.status, elapsed_ms, "api response");
            }
            Err(e) => match e.kind {
                ApiErrorKind::Forbidden => {
                    tracing::warn!(method, path = %req.path, elapsed_ms, message = %e.message, "access denied");
                }
                ApiErrorKind::RateLimited => {
                    tracing::warn!(method, path = %req.path, elapsed_ms, retry_after = ?e.retry_after, "rate limit exceeded");
                }
                ApiErrorKind::Server => {
                    tracing::error!(method, path = %req.path, status = e.status, elapsed_ms, message = %e.message, "server error");
                }
                ApiErrorKind::Connectivity => {
                    tracing::error!(method, path = %req.path, elapsed_ms, details = ?e.details, "network error");
                }
                _ => {
                    tracing::warn!(method, path = %req.path, status = e.status, elapsed_ms, message = %e.message, "api error");
                }
            },
        }

        res
    }
}

/// Mask secrets before a request body reaches the log.
fn redact(body: &serde_json::Value) -> serde_json::Value {
    const SECRET_KEYS: [&str; 4] = ["password", "api_hash", "code", "access_token"];

    match body {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if SECRET_KEYS.contains(&k.as_str()) {
                        (k.clone(), serde_json::Value::String("***".to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
