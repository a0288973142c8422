//! reqwest adapter for the panel's API gateway.
//!
//! Implements [`HttpTransport`]: puts bytes on the wire and hands back the
//! status, headers and body untouched. Status interpretation happens in the
//! core's middleware.

use std::time::Duration;

use async_trait::async_trait;

use tgpanel_core::{
    api::{ApiRequest, HttpTransport, Method, RawResponse, TransportError},
    errors::Error,
    Result,
};

const USER_AGENT: &str = concat!("tgpanel/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// `timeout` bounds the whole exchange; per-request timeouts may shorten it.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self { http })
    }

    fn method(m: Method) -> reqwest::Method {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }

    fn map_err(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() || e.is_request() {
            TransportError::Unreachable(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, req: &ApiRequest) -> std::result::Result<RawResponse, TransportError> {
        let mut builder = self
            .http
            .request(Self::method(req.method), &req.url)
            .timeout(req.timeout);

        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(Self::map_err)?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        // A body cut off mid-read means no usable response.
        let body = resp.text().await.map_err(Self::map_err)?;

        tracing::trace!(url = %req.url, status, "http exchange complete");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
