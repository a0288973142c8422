//! API gateway: one client, explicit middleware, one failure shape.

pub mod auth;
pub mod client;
pub mod error;
pub mod middleware;
pub mod transport;

pub use client::ApiClient;
pub use error::{ApiError, ApiErrorKind, ApiResult};
pub use transport::{ApiRequest, HttpTransport, Method, RawResponse, TransportError};
