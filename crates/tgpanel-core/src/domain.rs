use serde::{Deserialize, Serialize};

/// Authenticated identity as returned by the backend.
///
/// The record is opaque to the client: only a handful of fields are read for
/// display, everything else is carried through `extra` untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl User {
    /// Profile name for headers and greetings.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        if let Some(u) = self.username.as_deref().filter(|u| !u.trim().is_empty()) {
            return format!("@{}", u.trim());
        }
        self.phone_number
            .clone()
            .unwrap_or_else(|| "unknown user".to_string())
    }
}

/// Persisted bearer token plus the last-known user record.
#[derive(Clone, Debug, PartialEq)]
pub struct Credential {
    pub token: String,
    pub user: Option<User>,
}

/// Fields submitted on the login screen.
#[derive(Clone, Debug, Default)]
pub struct LoginCredentials {
    pub phone_number: String,
    pub api_id: String,
    pub api_hash: String,
}
