//! HTTP client for the launcher status query API.
//!
//! The query API answers `GET <base>/<ip>:<port>` with a JSON envelope
//! describing the server's live status. A failed lookup is reported as an
//! HTTP 200 whose body carries a top-level `"error"` key, so the body is
//! inspected before it is decoded into the typed model.
//!
//! The client performs exactly one request per call and never retries;
//! retry policy belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::QueryResponse;

const BASE_URL: &str = "https://dayzsalauncher.com/api/v1/query";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors returned by a status query.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (connect, timeout, TLS, ...).
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-200 status code.
    #[error("unexpected status code: {0}")]
    Status(u16),

    /// The API reported a query failure in the response body.
    #[error("error in response: {0}")]
    Api(String),

    /// The response body could not be decoded into the expected shape.
    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A single synchronous status exchange with a game server.
///
/// Implementations must return within a bounded time and must not retry
/// internally.
#[async_trait]
pub trait StatusQuery: Send + Sync {
    /// Queries the status of the server at `ip:port`.
    ///
    /// It is up to the caller to ensure `ip` and `port` are valid.
    async fn query(&self, ip: &str, port: u32) -> Result<QueryResponse, ClientError>;
}

/// Default `StatusQuery` implementation backed by the public launcher API.
pub struct LauncherClient {
    base_url: String,
    client: reqwest::Client,
}

impl LauncherClient {
    /// Creates a client against the default API endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Request` if the underlying HTTP client cannot
    /// be constructed.
    pub fn new() -> Result<Self, ClientError> {
        Self::with_base_url(BASE_URL)
    }

    /// Creates a client against a custom API endpoint. Used by tests.
    pub fn with_base_url(base_url: &str) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl StatusQuery for LauncherClient {
    async fn query(&self, ip: &str, port: u32) -> Result<QueryResponse, ClientError> {
        let url = format!("{}/{}:{}", self.base_url, ip, port);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;

        // The API signals lookup failures inside a 200 body.
        let raw: Value = serde_json::from_slice(&body)?;
        if let Some(err) = raw.get("error") {
            return Err(ClientError::Api(err.to_string()));
        }

        let parsed: QueryResponse = serde_json::from_slice(&body)?;
        Ok(parsed)
    }
}
