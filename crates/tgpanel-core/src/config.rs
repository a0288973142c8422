use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const API_PREFIX: &str = "/api/v1";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DASHBOARD_REFRESH: Duration = Duration::from_secs(30);

/// Typed configuration for the control panel client.
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend root, without the `/api/v1` prefix.
    pub api_base_url: String,
    pub api_timeout: Duration,
    pub token_file: PathBuf,
    pub dashboard_refresh: Duration,
    /// Log request/response bodies at debug level.
    pub log_requests: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout: DEFAULT_API_TIMEOUT,
            token_file: default_token_file(),
            dashboard_refresh: DEFAULT_DASHBOARD_REFRESH,
            log_requests: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let api_base_url = normalize_base_url(
            &env_str("TGPANEL_API_BASE_URL")
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        )?;

        let api_timeout = env_u64("TGPANEL_API_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_API_TIMEOUT);

        let token_file = env_path("TGPANEL_TOKEN_FILE").unwrap_or_else(default_token_file);

        let dashboard_refresh = env_u64("TGPANEL_DASHBOARD_REFRESH_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DASHBOARD_REFRESH);

        let log_requests = env_bool("TGPANEL_LOG_REQUESTS").unwrap_or(false);

        Ok(Self {
            api_base_url,
            api_timeout,
            token_file,
            dashboard_refresh,
            log_requests,
        })
    }

    /// Base URL for versioned API calls.
    pub fn api_url(&self) -> String {
        format!("{}{API_PREFIX}", self.api_base_url)
    }
}

/// Trim trailing slashes and require an http(s) scheme.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let url = raw.trim().trim_end_matches('/');
    let Some(host) = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
    else {
        return Err(Error::Config(format!(
            "TGPANEL_API_BASE_URL must start with http:// or https:// (got {raw:?})"
        )));
    };
    if host.is_empty() {
        return Err(Error::Config(format!(
            "TGPANEL_API_BASE_URL has no host (got {raw:?})"
        )));
    }
    Ok(url.to_string())
}

fn default_token_file() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".config/tgpanel/credentials.json"),
        None => PathBuf::from("/tmp/tgpanel-credentials.json"),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}
