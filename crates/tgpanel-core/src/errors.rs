use crate::{api::error::ApiError, session::AuthStep};

/// Core error type for the control panel client.
///
/// Remote failures arrive already normalised as [`ApiError`]; everything the
/// view layer shows as inline text goes through `Display`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Validation(String),

    /// 2xx reply that did not grant what was asked for.
    #[error("{0}")]
    Rejected(String),

    #[error("another action is already in progress")]
    Busy,

    #[error("cannot {action} while in step {step}")]
    InvalidStep { action: &'static str, step: AuthStep },

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// The normalised API failure, if this error came from the gateway.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
