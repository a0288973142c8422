//! `/auth/*` endpoints and their wire types.

use serde::{Deserialize, Serialize};

use crate::domain::User;

use super::{
    client::ApiClient,
    error::ApiResult,
    transport::Method,
};

#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest {
    pub phone_number: String,
    pub api_id: String,
    pub api_hash: String,
}

/// Flags may be absent or `null`; both read as false.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VerifyCodeRequest {
    pub phone_number: String,
    pub code: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct VerifyCodeResponse {
    #[serde(default)]
    pub requires_2fa: Option<bool>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Verify2faRequest {
    pub phone_number: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthStatus {
    #[serde(default)]
    pub authenticated: bool,
}

/// `/auth/me` answers either `{ "user": {...} }` or the bare user object.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum MeResponse {
    Wrapped { user: User },
    Bare(User),
}

impl LoginResponse {
    pub fn accepted(&self) -> bool {
        self.success.unwrap_or(false)
    }
}

impl VerifyCodeResponse {
    pub fn needs_2fa(&self) -> bool {
        self.requires_2fa.unwrap_or(false)
    }
}

impl ApiClient {
    pub async fn login(&self, req: &LoginRequest) -> ApiResult<LoginResponse> {
        self.post_json("/auth/login", Some(req)).await
    }

    pub async fn verify_code(&self, req: &VerifyCodeRequest) -> ApiResult<VerifyCodeResponse> {
        self.post_json("/auth/verify-code", Some(req)).await
    }

    pub async fn verify_2fa(&self, req: &Verify2faRequest) -> ApiResult<TokenResponse> {
        self.post_json("/auth/verify-2fa", Some(req)).await
    }

    /// Remote logout. The body is ignored.
    pub async fn logout(&self) -> ApiResult<()> {
        self.execute(self.request(Method::Post, "/auth/logout"))
            .await
            .map(|_| ())
    }

    pub async fn auth_status(&self) -> ApiResult<AuthStatus> {
        self.get_json("/auth/status").await
    }

    pub async fn me(&self) -> ApiResult<User> {
        let resp: MeResponse = self.get_json("/auth/me").await?;
        Ok(match resp {
            MeResponse::Wrapped { user } => user,
            MeResponse::Bare(user) => user,
        })
    }

    /// Backend liveness (`GET <root>/health`).
    pub async fn health(&self) -> ApiResult<serde_json::Value> {
        self.send_json(self.root_request(Method::Get, "/health"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        api::client::testing::FakeTransport, config::Config, token_store::MemoryTokenStore,
    };

    fn api(transport: Arc<FakeTransport>) -> ApiClient {
        let cfg = Config {
            api_base_url: "http://panel.test".to_string(),
            ..Config::default()
        };
        ApiClient::new(&cfg, transport, Arc::new(MemoryTokenStore::new()))
    }

    #[tokio::test]
    async fn login_posts_all_three_fields() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(200, json!({ "success": true, "message": "Code sent" }));

        let resp = api(transport.clone())
            .login(&LoginRequest {
                phone_number: "+15551234567".to_string(),
                api_id: "123".to_string(),
                api_hash: "abc".to_string(),
            })
            .await
            .unwrap();
        assert!(resp.accepted());
        assert_eq!(resp.message.as_deref(), Some("Code sent"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.path, "/auth/login");
        assert_eq!(
            sent.body,
            Some(json!({ "phone_number": "+15551234567", "api_id": "123", "api_hash": "abc" }))
        );
    }

    #[tokio::test]
    async fn verify_code_tolerates_missing_optional_fields() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(200, json!({ "message": "Two-factor required", "success": true }));

        let resp = api(transport)
            .verify_code(&VerifyCodeRequest {
                phone_number: "+15551234567".to_string(),
                code: "54321".to_string(),
            })
            .await
            .unwrap();
        assert!(!resp.needs_2fa());
        assert!(resp.access_token.is_none());
    }

    #[tokio::test]
    async fn null_flags_read_as_false() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .reply(200, json!({ "success": null, "message": "try later" }))
            .reply(200, json!({ "requires_2fa": null, "access_token": "tok1" }));
        let api = api(transport);

        let login = api
            .login(&LoginRequest {
                phone_number: "+15551234567".to_string(),
                api_id: "123".to_string(),
                api_hash: "abc".to_string(),
            })
            .await
            .unwrap();
        assert!(!login.accepted());

        let code = api
            .verify_code(&VerifyCodeRequest {
                phone_number: "+15551234567".to_string(),
                code: "54321".to_string(),
            })
            .await
            .unwrap();
        assert!(!code.needs_2fa());
        assert_eq!(code.access_token.as_deref(), Some("tok1"));
    }

    #[tokio::test]
    async fn me_accepts_wrapped_and_bare_user() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .reply(200, json!({ "user": { "phone_number": "+1555" } }))
            .reply(200, json!({ "id": 3, "phone_number": "+1666" }));
        let api = api(transport);

        assert_eq!(api.me().await.unwrap().phone_number.as_deref(), Some("+1555"));
        assert_eq!(api.me().await.unwrap().phone_number.as_deref(), Some("+1666"));
    }

    #[tokio::test]
    async fn health_uses_unversioned_root() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(200, json!({ "status": "healthy" }));

        let v = api(transport.clone()).health().await.unwrap();
        assert_eq!(v["status"], "healthy");
        assert_eq!(transport.requests()[0].url, "http://panel.test/health");
    }
}
