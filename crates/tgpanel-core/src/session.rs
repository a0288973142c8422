use std::{fmt, sync::Arc};

use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::{
    api::{
        auth::{LoginRequest, Verify2faRequest, VerifyCodeRequest, VerifyCodeResponse},
        ApiClient, ApiError,
    },
    domain::{LoginCredentials, User},
    errors::Error,
    token_store::TokenStore,
    utils::token_fingerprint,
    validation::{validate_2fa_password, validate_code, validate_login},
    Result,
};

/// Stage of the login flow. There is no terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStep {
    Login,
    AwaitingCode,
    Awaiting2fa,
    Authenticated,
}

impl AuthStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStep::Login => "login",
            AuthStep::AwaitingCode => "awaiting_code",
            AuthStep::Awaiting2fa => "awaiting_2fa",
            AuthStep::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the session for the rendering layer.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub step: AuthStep,
    pub user: Option<User>,
    pub pending_phone_number: Option<String>,
    pub is_busy: bool,
    /// True while the startup credential check runs.
    pub is_resuming: bool,
    pub last_error: Option<String>,
}

/// Result of a successful code submission.
#[derive(Clone, Debug, PartialEq)]
pub enum CodeOutcome {
    Authenticated(User),
    TwoFactorRequired { message: Option<String> },
}

#[derive(Debug)]
struct SessionState {
    step: AuthStep,
    user: Option<User>,
    pending_phone_number: Option<String>,
    is_busy: bool,
    is_resuming: bool,
    last_error: Option<String>,
    unauthorized: watch::Receiver<u64>,
}

impl SessionState {
    fn force_login(&mut self) {
        self.step = AuthStep::Login;
        self.user = None;
        self.pending_phone_number = None;
    }

    /// Consume 401s raised by calls this session did not make.
    ///
    /// Skipped while an action is in flight; that action settles the step.
    fn apply_unauthorized(&mut self) {
        if self.is_busy || !self.unauthorized.has_changed().unwrap_or(false) {
            return;
        }
        self.unauthorized.borrow_and_update();
        if self.step != AuthStep::Login {
            tracing::info!(from = %self.step, "credential rejected by server; back to login");
            self.force_login();
        }
    }

    fn mark_unauthorized_seen(&mut self) {
        self.unauthorized.borrow_and_update();
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            step: self.step,
            user: self.user.clone(),
            pending_phone_number: self.pending_phone_number.clone(),
            is_busy: self.is_busy,
            is_resuming: self.is_resuming,
            last_error: self.last_error.clone(),
        }
    }
}

/// The authentication state machine.
///
/// One instance per process, built at startup and handed to whoever renders
/// it. Actions take `&self`; the busy flag admits one network action at a
/// time and every other call made meanwhile is rejected with
/// [`Error::Busy`]. The state lock is never held across a network call.
pub struct AuthSession {
    api: Arc<ApiClient>,
    store: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
}

impl AuthSession {
    pub fn new(api: Arc<ApiClient>, store: Arc<dyn TokenStore>) -> Self {
        let unauthorized = api.subscribe_unauthorized();
        Self {
            api,
            store,
            state: Mutex::new(SessionState {
                step: AuthStep::Login,
                user: None,
                pending_phone_number: None,
                is_busy: false,
                is_resuming: false,
                last_error: None,
                unauthorized,
            }),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let mut st = self.state.lock().await;
        st.apply_unauthorized();
        st.snapshot()
    }

    pub async fn step(&self) -> AuthStep {
        self.snapshot().await.step
    }

    /// Startup: turn a persisted credential back into an authenticated
    /// session, or discard it.
    ///
    /// Returns whether the session ended up authenticated. Remote failures
    /// are not errors here; they clear the credential and leave the session
    /// on the login step.
    pub async fn resume(&self) -> Result<bool> {
        {
            let mut st = self.state.lock().await;
            if st.is_busy {
                return Err(Error::Busy);
            }
            if st.step != AuthStep::Login {
                return Err(Error::InvalidStep {
                    action: "resume session",
                    step: st.step,
                });
            }
            let Some(cred) = self.store.get() else {
                tracing::debug!("no stored credential; starting at login");
                return Ok(false);
            };
            tracing::info!(token = %token_fingerprint(&cred.token), "resuming stored session");
            st.is_busy = true;
            st.is_resuming = true;
            st.last_error = None;
        }

        let resolved = match self.api.auth_status().await {
            Ok(status) if status.authenticated => self.api.me().await.map(Some),
            Ok(_) => Ok(None),
            Err(e) => Err(e),
        };

        let mut st = self.state.lock().await;
        st.is_busy = false;
        st.is_resuming = false;
        match resolved {
            Ok(Some(user)) => {
                // Re-read: a 401 elsewhere may have cleared it meanwhile.
                match self.store.token() {
                    Some(token) => {
                        if let Err(e) = self.store.set(&token, Some(&user)) {
                            tracing::warn!(error = %e, "failed to refresh cached user");
                        }
                        tracing::info!(user = %user.display_name(), "session resumed");
                        st.step = AuthStep::Authenticated;
                        st.user = Some(user);
                        st.mark_unauthorized_seen();
                        Ok(true)
                    }
                    None => {
                        st.force_login();
                        Ok(false)
                    }
                }
            }
            Ok(None) => {
                tracing::info!("stored credential no longer valid; cleared");
                self.discard_credential();
                st.force_login();
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "session check failed; credential cleared");
                self.discard_credential();
                st.force_login();
                st.mark_unauthorized_seen();
                if !e.is_unauthorized() {
                    st.last_error = Some(e.to_string());
                }
                Ok(false)
            }
        }
    }

    /// Submit phone number and API identity; on success a code is on its way.
    pub async fn login(&self, creds: &LoginCredentials) -> Result<Option<String>> {
        let creds = self
            .begin("log in", &[AuthStep::Login], |_| validate_login(creds))
            .await?;

        let req = LoginRequest {
            phone_number: creds.phone_number.clone(),
            api_id: creds.api_id,
            api_hash: creds.api_hash,
        };

        match self.api.login(&req).await {
            Ok(resp) if resp.accepted() => {
                let mut st = self.state.lock().await;
                st.is_busy = false;
                st.step = AuthStep::AwaitingCode;
                tracing::info!(phone = %mask_phone(&creds.phone_number), "login accepted; awaiting code");
                st.pending_phone_number = Some(creds.phone_number);
                Ok(resp.message)
            }
            Ok(resp) => {
                self.fail(Error::Rejected(
                    resp.message.unwrap_or_else(|| "Login failed".to_string()),
                ))
                .await
            }
            Err(e) => self.fail(e.into()).await,
        }
    }

    /// Submit the code sent to the pending phone number.
    pub async fn verify_code(&self, code: &str) -> Result<CodeOutcome> {
        let (phone_number, code) = self
            .begin("verify code", &[AuthStep::AwaitingCode], |st| {
                let code = validate_code(code)?;
                Ok((pending_phone(st)?, code))
            })
            .await?;

        let req = VerifyCodeRequest {
            phone_number: phone_number.clone(),
            code,
        };

        match self.api.verify_code(&req).await {
            Ok(resp) if resp.needs_2fa() => {
                let mut st = self.state.lock().await;
                st.is_busy = false;
                st.step = AuthStep::Awaiting2fa;
                tracing::info!(phone = %mask_phone(&phone_number), "code accepted; 2FA password required");
                Ok(CodeOutcome::TwoFactorRequired {
                    message: resp.message,
                })
            }
            Ok(VerifyCodeResponse {
                access_token: Some(token),
                user,
                ..
            }) if !token.trim().is_empty() => {
                let user = self.complete(&token, user, &phone_number).await;
                Ok(CodeOutcome::Authenticated(user))
            }
            Ok(resp) => {
                self.fail(Error::Rejected(
                    resp.message
                        .unwrap_or_else(|| "Code verification failed".to_string()),
                ))
                .await
            }
            Err(e) => self.fail(e.into()).await,
        }
    }

    /// Submit the two-factor (cloud) password.
    pub async fn verify_2fa(&self, password: &str) -> Result<User> {
        let phone_number = self
            .begin("verify 2FA password", &[AuthStep::Awaiting2fa], |st| {
                validate_2fa_password(password)?;
                pending_phone(st)
            })
            .await?;

        let req = Verify2faRequest {
            phone_number: phone_number.clone(),
            password: password.to_string(),
        };

        match self.api.verify_2fa(&req).await {
            Ok(resp) => match resp.access_token.filter(|t| !t.trim().is_empty()) {
                Some(token) => Ok(self.complete(&token, resp.user, &phone_number).await),
                None => {
                    self.fail(Error::Rejected(
                        resp.message
                            .unwrap_or_else(|| "2FA verification failed".to_string()),
                    ))
                    .await
                }
            },
            Err(e) => self.fail(e.into()).await,
        }
    }

    /// Abandon a half-finished login and go back to the first screen.
    pub async fn reset(&self) -> Result<()> {
        let mut st = self.state.lock().await;
        if st.is_busy {
            return Err(Error::Busy);
        }
        match st.step {
            AuthStep::Login => Ok(()),
            AuthStep::AwaitingCode | AuthStep::Awaiting2fa => {
                tracing::info!(from = %st.step, "login flow reset");
                st.force_login();
                st.last_error = None;
                Ok(())
            }
            AuthStep::Authenticated => Err(Error::InvalidStep {
                action: "reset",
                step: st.step,
            }),
        }
    }

    /// Log out. Always ends on the login step with no stored credential;
    /// the remote call is best-effort.
    pub async fn logout(&self) -> Result<()> {
        let call_remote = {
            let mut st = self.state.lock().await;
            if st.is_busy {
                return Err(Error::Busy);
            }
            st.is_busy = true;
            st.last_error = None;
            st.user.is_some() || self.store.get().is_some()
        };

        if call_remote {
            if let Err(e) = self.api.logout().await {
                tracing::warn!(error = %e, "remote logout failed; clearing local session anyway");
            }
        }

        self.discard_credential();

        let mut st = self.state.lock().await;
        st.force_login();
        st.is_busy = false;
        st.mark_unauthorized_seen();
        tracing::info!("logged out");
        Ok(())
    }

    /// Admit one action: reject when busy or from the wrong step, clear the
    /// previous error, run the local check, then mark busy.
    async fn begin<T>(
        &self,
        action: &'static str,
        allowed: &[AuthStep],
        check: impl FnOnce(&SessionState) -> Result<T>,
    ) -> Result<T> {
        let mut st = self.state.lock().await;
        st.apply_unauthorized();
        if st.is_busy {
            return Err(Error::Busy);
        }
        if !allowed.contains(&st.step) {
            return Err(Error::InvalidStep {
                action,
                step: st.step,
            });
        }
        st.last_error = None;
        match check(&*st) {
            Ok(v) => {
                st.is_busy = true;
                Ok(v)
            }
            Err(e) => {
                st.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Failure exit for an admitted action. A 401 also drops back to login.
    async fn fail<T>(&self, err: Error) -> Result<T> {
        let mut st = self.state.lock().await;
        st.is_busy = false;
        if err.as_api().is_some_and(ApiError::is_unauthorized) {
            tracing::info!(from = %st.step, "unauthorized; back to login");
            st.force_login();
            st.mark_unauthorized_seen();
        } else {
            tracing::warn!(step = %st.step, error = %err, "auth action failed");
        }
        st.last_error = Some(err.to_string());
        Err(err)
    }

    /// Success exit for code/2FA: persist, then enter the authenticated step.
    async fn complete(&self, token: &str, user: Option<User>, phone_number: &str) -> User {
        let user = user.unwrap_or_else(|| User {
            phone_number: Some(phone_number.to_string()),
            ..User::default()
        });

        if let Err(e) = self.store.set(token, Some(&user)) {
            tracing::warn!(error = %e, "failed to persist credential; session will not survive restart");
        }

        let mut st = self.state.lock().await;
        st.is_busy = false;
        st.step = AuthStep::Authenticated;
        st.user = Some(user.clone());
        st.pending_phone_number = None;
        st.mark_unauthorized_seen();
        tracing::info!(user = %user.display_name(), token = %token_fingerprint(token), "authenticated");
        user
    }

    fn discard_credential(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear stored credential");
        }
    }
}

fn pending_phone(st: &SessionState) -> Result<String> {
    st.pending_phone_number
        .clone()
        .ok_or_else(|| Error::Validation("No login in progress; please start again".to_string()))
}

/// Keep the country prefix and last four digits.
fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}
