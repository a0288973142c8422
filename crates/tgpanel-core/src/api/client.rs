use std::{sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;

use crate::{config::Config, token_store::TokenStore};

use super::{
    error::{ApiError, ApiErrorKind, ApiResult},
    middleware::{
        BearerAuth, ErrorNormalizer, RequestMiddleware, RequestTimer, ResponseLogger,
        ResponseMiddleware, UnauthorizedGuard, UnauthorizedSignal,
    },
    transport::{ApiRequest, HttpTransport, Method, RawResponse},
};

/// The single gateway every component calls through.
pub struct ApiClient {
    base_url: String,
    root_url: String,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    request_chain: Vec<Arc<dyn RequestMiddleware>>,
    response_chain: Vec<Arc<dyn ResponseMiddleware>>,
    unauthorized: UnauthorizedSignal,
}

impl ApiClient {
    /// Client with the standard middleware stack:
    /// bearer auth and timing on the way out; normalisation, 401 handling and
    /// logging on the way back.
    pub fn new(cfg: &Config, transport: Arc<dyn HttpTransport>, store: Arc<dyn TokenStore>) -> Self {
        let client = Self::bare(cfg, transport);
        let signal = client.unauthorized.clone();
        client
            .with_request_middleware(Arc::new(BearerAuth::new(store.clone())))
            .with_request_middleware(Arc::new(RequestTimer::new(cfg.log_requests)))
            .with_response_middleware(Arc::new(ErrorNormalizer))
            .with_response_middleware(Arc::new(UnauthorizedGuard::new(store, signal)))
            .with_response_middleware(Arc::new(ResponseLogger::new(cfg.log_requests)))
    }

    /// Client with no middleware at all.
    pub fn bare(cfg: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: cfg.api_url(),
            root_url: cfg.api_base_url.clone(),
            timeout: cfg.api_timeout,
            transport,
            request_chain: Vec::new(),
            response_chain: Vec::new(),
            unauthorized: UnauthorizedSignal::new(),
        }
    }

    pub fn with_request_middleware(mut self, m: Arc<dyn RequestMiddleware>) -> Self {
        self.request_chain.push(m);
        self
    }

    pub fn with_response_middleware(mut self, m: Arc<dyn ResponseMiddleware>) -> Self {
        self.response_chain.push(m);
        self
    }

    pub fn subscribe_unauthorized(&self) -> watch::Receiver<u64> {
        self.unauthorized.subscribe()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request against the versioned API (`<base>/api/v1<path>`).
    pub fn request(&self, method: Method, path: &str) -> ApiRequest {
        ApiRequest::new(method, &self.base_url, path, self.timeout)
    }

    /// Request against the bare backend root (health checks).
    pub fn root_request(&self, method: Method, path: &str) -> ApiRequest {
        ApiRequest::new(method, &self.root_url, path, self.timeout)
    }

    /// Run one request through the middleware and the transport.
    ///
    /// The timeout is enforced here as well as in the transport, so every call
    /// is bounded regardless of the wire implementation.
    pub async fn execute(&self, mut req: ApiRequest) -> ApiResult<RawResponse> {
        for m in &self.request_chain {
            m.on_request(&mut req);
        }

        let sent = match tokio::time::timeout(req.timeout, self.transport.send(&req)).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(ApiError::from_transport(&e)),
            Err(_) => Err(ApiError::from_transport(
                &super::transport::TransportError::Timeout,
            )),
        };

        self.response_chain
            .iter()
            .fold(sent, |res, m| m.on_response(&req, res))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send_json(self.request(Method::Get, path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: Option<&B>) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self.request(Method::Post, path);
        if let Some(b) = body {
            req.body = Some(
                serde_json::to_value(b)
                    .map_err(|e| ApiError::new(ApiErrorKind::Request, 0, e.to_string()))?,
            );
        }
        self.send_json(req).await
    }

    pub async fn send_json<T: DeserializeOwned>(&self, req: ApiRequest) -> ApiResult<T> {
        let raw = self.execute(req).await?;
        if !raw.is_success() {
            return Err(ApiError::from_response(&raw));
        }
        raw.json().map_err(|e| ApiError::decode(raw.status, e))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeTransport, Scripted};
    use super::*;
    use crate::{api::transport::TransportError, token_store::MemoryTokenStore};
    use serde_json::json;

    fn cfg() -> Config {
        Config {
            api_base_url: "http://panel.test".to_string(),
            ..Config::default()
        }
    }

    fn client(
        transport: Arc<FakeTransport>,
        store: Arc<MemoryTokenStore>,
    ) -> ApiClient {
        ApiClient::new(&cfg(), transport, store)
    }

    #[tokio::test]
    async fn requests_carry_bearer_token_and_versioned_url() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(200, json!({ "authenticated": true }));
        let store = Arc::new(MemoryTokenStore::with_credential("tok1", None));

        let v: serde_json::Value = client(transport.clone(), store)
            .get_json("/auth/status")
            .await
            .unwrap();
        assert_eq!(v["authenticated"], true);

        let sent = transport.requests();
        assert_eq!(sent[0].url, "http://panel.test/api/v1/auth/status");
        assert_eq!(sent[0].header("Authorization"), Some("Bearer tok1"));
        assert!(sent[0].started_at.is_some());
    }

    #[tokio::test]
    async fn no_token_means_no_authorization_header() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(200, json!({}));
        let store = Arc::new(MemoryTokenStore::new());

        let _: serde_json::Value = client(transport.clone(), store)
            .get_json("/health")
            .await
            .unwrap();
        assert_eq!(transport.requests()[0].header("Authorization"), None);
    }

    #[tokio::test]
    async fn unauthorized_clears_store_from_any_endpoint() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(401, json!({ "detail": "Invalid authentication credentials" }));
        let store = Arc::new(MemoryTokenStore::with_credential("tok1", None));
        let api = client(transport, store.clone());
        let rx = api.subscribe_unauthorized();

        let err = api
            .get_json::<serde_json::Value>("/messages/stats")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Unauthorized);
        assert_eq!(err.message, "Invalid authentication credentials");
        assert_eq!(store.get(), None);
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn forbidden_and_server_errors_keep_credential() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .reply(403, json!({ "message": "Insufficient permissions" }))
            .reply(500, json!({ "message": "Internal server error" }));
        let store = Arc::new(MemoryTokenStore::with_credential("tok1", None));
        let api = client(transport.clone(), store.clone());

        let e = api.get_json::<serde_json::Value>("/settings").await.unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::Forbidden);
        let e = api.get_json::<serde_json::Value>("/settings").await.unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::Server);

        assert!(store.get().is_some());
        // No automatic retry.
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_connectivity_not_server() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Scripted::Fail(TransportError::Unreachable(
            "connection refused".to_string(),
        )));
        let api = client(transport, Arc::new(MemoryTokenStore::new()));

        let e = api.get_json::<serde_json::Value>("/health").await.unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::Connectivity);
        assert_eq!(e.status, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_timeout_reports_connectivity() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Scripted::Slow(
            Duration::from_secs(60),
            RawResponse::new(200, "{}"),
        ));
        let api = client(transport, Arc::new(MemoryTokenStore::new()));
        assert_eq!(api.timeout(), Duration::from_secs(30));

        let e = api.get_json::<serde_json::Value>("/dashboard/stats").await.unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_unit_like_value() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Scripted::Reply(RawResponse::new(204, "")));
        let api = client(transport, Arc::new(MemoryTokenStore::new()));

        let v: serde_json::Value = api
            .post_json::<serde_json::Value, _>("/auth/logout", None)
            .await
            .unwrap();
        assert!(v.is_null());
    }

    #[tokio::test]
    async fn malformed_success_body_is_decode_error() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Scripted::Reply(RawResponse::new(200, "not json")));
        let api = client(transport, Arc::new(MemoryTokenStore::new()));

        let e = api.get_json::<serde_json::Value>("/auth/me").await.unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::Decode);
    }

    #[tokio::test]
    async fn bare_client_still_normalises_json_helpers() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(429, json!({ "message": "slow down" }));
        let api = ApiClient::bare(&cfg(), transport);

        let e = api.get_json::<serde_json::Value>("/groups").await.unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::RateLimited);
    }
}
