//! Core of the Telegram automation control panel client.
//!
//! Authentication state machine, credential storage and the API gateway.
//! The HTTP wire lives behind [`api::HttpTransport`], implemented in an
//! adapter crate; rendering lives in the binary.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod router;
pub mod session;
pub mod token_store;
pub mod utils;
pub mod validation;

pub use errors::{Error, Result};
