//! End-to-end: session + gateway + reqwest transport against a mock backend.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tgpanel_core::{
    api::{ApiClient, ApiErrorKind},
    config::Config,
    domain::LoginCredentials,
    session::{AuthSession, AuthStep, CodeOutcome},
    token_store::{FileTokenStore, TokenStore},
};
use tgpanel_http::ReqwestTransport;

struct Panel {
    store: Arc<FileTokenStore>,
    api: Arc<ApiClient>,
    session: AuthSession,
}

fn tmp_store(prefix: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}/credentials.json"))
}

fn panel(server_uri: &str, prefix: &str, timeout: Duration) -> Panel {
    let cfg = Config {
        api_base_url: server_uri.to_string(),
        api_timeout: timeout,
        token_file: tmp_store(prefix),
        ..Config::default()
    };
    let store = Arc::new(FileTokenStore::new(cfg.token_file.clone()));
    let transport = Arc::new(ReqwestTransport::new(cfg.api_timeout).unwrap());
    let api = Arc::new(ApiClient::new(&cfg, transport, store.clone()));
    let session = AuthSession::new(api.clone(), store.clone());
    Panel {
        store,
        api,
        session,
    }
}

fn creds() -> LoginCredentials {
    LoginCredentials {
        phone_number: "+15551234567".to_string(),
        api_id: "123".to_string(),
        api_hash: "abc".to_string(),
    }
}

#[tokio::test]
async fn code_login_persists_credential_and_authorizes_later_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_json(json!({
            "phone_number": "+15551234567",
            "api_id": "123",
            "api_hash": "abc"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "message": "Code sent" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/verify-code"))
        .and(body_json(json!({ "phone_number": "+15551234567", "code": "54321" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok1",
            "token_type": "bearer",
            "user": { "id": 1, "phone_number": "+15551234567" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/auth/status"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authenticated": true })))
        .expect(1)
        .mount(&server)
        .await;

    let p = panel(&server.uri(), "tgpanel-http-login", Duration::from_secs(30));

    p.session.login(&creds()).await.unwrap();
    let s = p.session.snapshot().await;
    assert_eq!(s.step, AuthStep::AwaitingCode);
    assert_eq!(s.pending_phone_number.as_deref(), Some("+15551234567"));

    let outcome = p.session.verify_code("54321").await.unwrap();
    assert!(matches!(outcome, CodeOutcome::Authenticated(_)));

    let cred = p.store.get().expect("credential persisted");
    assert_eq!(cred.token, "tok1");
    assert_eq!(
        cred.user.and_then(|u| u.phone_number).as_deref(),
        Some("+15551234567")
    );

    let status = p.api.auth_status().await.unwrap();
    assert!(status.authenticated);
}

#[tokio::test]
async fn restart_resumes_from_file_store() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/auth/status"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authenticated": true })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "phone_number": "+15551234567",
            "created_at": "2024-01-01T00:00:00"
        })))
        .mount(&server)
        .await;

    let p = panel(&server.uri(), "tgpanel-http-resume", Duration::from_secs(30));
    p.store.set("tok1", None).unwrap();

    assert!(p.session.resume().await.unwrap());
    let s = p.session.snapshot().await;
    assert_eq!(s.step, AuthStep::Authenticated);
    assert!(p.store.get().and_then(|c| c.user).is_some());
}

#[tokio::test]
async fn unauthorized_clears_file_store_and_forces_login() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/auth/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authenticated": true })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": { "id": 1 } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/stats"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "detail": "Invalid authentication credentials" })),
        )
        .mount(&server)
        .await;

    let p = panel(&server.uri(), "tgpanel-http-401", Duration::from_secs(30));
    p.store.set("tok1", None).unwrap();
    assert!(p.session.resume().await.unwrap());

    let err = p
        .api
        .get_json::<serde_json::Value>("/groups/stats")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Unauthorized);
    assert_eq!(p.store.get(), None);
    assert!(!p.store.path().exists());
    assert_eq!(p.session.step().await, AuthStep::Login);
}

#[tokio::test]
async fn rate_limit_surfaces_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "30")
                .set_body_json(json!({ "error": "Rate limit exceeded", "error_code": "RATE_LIMIT" })),
        )
        .mount(&server)
        .await;

    let p = panel(&server.uri(), "tgpanel-http-429", Duration::from_secs(30));
    let err = p.session.login(&creds()).await.unwrap_err();
    let api_err = err.as_api().expect("api error");
    assert_eq!(api_err.kind, ApiErrorKind::RateLimited);
    assert_eq!(api_err.status, 429);
    assert_eq!(api_err.retry_after, Some(30));
    assert_eq!(api_err.error_code.as_deref(), Some("RATE_LIMIT"));

    let s = p.session.snapshot().await;
    assert_eq!(s.step, AuthStep::Login);
    assert!(!s.is_busy);
    assert!(s.last_error.unwrap().contains("retry after 30s"));
}

#[tokio::test]
async fn slow_backend_times_out_as_connectivity_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "healthy" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let p = panel(&server.uri(), "tgpanel-http-timeout", Duration::from_millis(200));
    let err = p.api.health().await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Connectivity);
    assert_eq!(err.status, 0);
}

#[tokio::test]
async fn unreachable_backend_is_connectivity_not_server_error() {
    // Grab a free port, then release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let p = panel(&uri, "tgpanel-http-down", Duration::from_secs(5));
    let err = p.api.health().await.unwrap_err();
    assert_eq!(err.kind, ApiErrorKind::Connectivity);
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "message": "Internal server error" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let p = panel(&server.uri(), "tgpanel-http-500", Duration::from_secs(30));
    let err = p.session.login(&creds()).await.unwrap_err();
    assert_eq!(err.as_api().map(|e| e.kind), Some(ApiErrorKind::Server));
    assert_eq!(
        p.session.snapshot().await.last_error.as_deref(),
        Some("Internal server error")
    );
}
