//! Client-held credential persistence.
//!
//! One bearer token plus the last-known user record, keyed by fixed names and
//! overwritten wholesale. Read failures degrade to "no credential".

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{Credential, User},
    errors::Error,
    utils::{iso_timestamp_utc, token_fingerprint},
    Result,
};

/// Storage port for the persisted credential.
///
/// Every method is synchronous; callers read the token once per request and
/// never cache it, so a `set` or `clear` is visible to the very next `get`.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<Credential>;
    fn set(&self, token: &str, user: Option<&User>) -> Result<()>;
    fn clear(&self) -> Result<()>;

    fn token(&self) -> Option<String> {
        self.get().map(|c| c.token)
    }
}

/// On-disk document. Field names are the well-known storage keys.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    auth_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_data: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<String>,
}

/// JSON-file token store.
pub struct FileTokenStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<Credential> {
        let txt = match fs::read_to_string(&self.path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "credential file unreadable");
                return None;
            }
        };
        if txt.trim().is_empty() {
            return None;
        }
        let stored: StoredCredential = match serde_json::from_str(&txt) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "credential file corrupt; ignoring");
                return None;
            }
        };
        if stored.auth_token.trim().is_empty() {
            return None;
        }
        Some(Credential {
            token: stored.auth_token,
            user: stored.user_data,
        })
    }

    fn write(&self, stored: &StoredCredential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let txt = serde_json::to_string_pretty(stored)?;
        let tmp = self.tmp_path();
        write_private(&tmp, txt.as_bytes())?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::Io(e)
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "credentials.json".into());
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        self.io.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<Credential> {
        let _guard = self.lock();
        self.read()
    }

    fn set(&self, token: &str, user: Option<&User>) -> Result<()> {
        let _guard = self.lock();
        self.write(&StoredCredential {
            auth_token: token.to_string(),
            user_data: user.cloned(),
            saved_at: Some(iso_timestamp_utc()),
        })?;
        tracing::debug!(token = %token_fingerprint(token), "credential stored");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "credential cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)?;
    Ok(())
}

/// In-process store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(token: impl Into<String>, user: Option<User>) -> Self {
        Self {
            inner: Mutex::new(Some(Credential {
                token: token.into(),
                user,
            })),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<Credential> {
        self.slot().clone()
    }

    fn set(&self, token: &str, user: Option<&User>) -> Result<()> {
        *self.slot() = Some(Credential {
            token: token.to_string(),
            user: user.cloned(),
        });
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
