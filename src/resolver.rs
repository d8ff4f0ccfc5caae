//! Public address detection and caching.
//!
//! Servers configured with `override_ip` are queried at whatever address the
//! host is currently reachable from the outside, rather than at their static
//! configured IP. The `AddressResolver` keeps that externally visible address
//! fresh: a mandatory blocking fetch at startup, then a background refresh
//! loop that replaces the cached value on success and retains the last known
//! good value on failure.
//!
//! Reads are lock-cheap: a single `RwLock<String>` guarded only for the
//! duration of a clone, never across an await point.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use serde::Deserialize;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const ENDPOINT: &str = "https://ifconfig.net/json";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Errors that can occur while resolving the public address.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// Transport-level failure while contacting the address source.
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),

    /// The address source answered with a non-200 status code.
    #[error("unexpected status code: {0}")]
    Status(u16),

    /// The address source returned an empty address.
    #[error("empty ip address")]
    EmptyAddress,
}

/// Subset of the address source's JSON response the resolver cares about.
#[derive(Debug, Deserialize)]
struct AddressInfo {
    #[serde(default)]
    ip: String,
}

/// Caches the host's externally visible address.
///
/// Single writer (the refresh loop), many concurrent readers (one per server
/// polling loop in override mode).
pub struct AddressResolver {
    endpoint: String,
    client: reqwest::Client,
    address: RwLock<String>,
}

impl AddressResolver {
    /// Creates a resolver against the default address source.
    ///
    /// # Errors
    ///
    /// Returns `ResolverError::Request` if the underlying HTTP client cannot
    /// be constructed.
    pub fn new() -> Result<Self, ResolverError> {
        Self::with_endpoint(ENDPOINT)
    }

    /// Creates a resolver against a custom address source. Used by tests.
    pub fn with_endpoint(endpoint: &str) -> Result<Self, ResolverError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
            address: RwLock::new(String::new()),
        })
    }

    /// Performs the mandatory first fetch, then spawns the background
    /// refresh loop. The loop terminates when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Fails if the first fetch errors or yields an empty address. Dependent
    /// polling loops must not start before this returns successfully.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<(), ResolverError> {
        let ip = self.fetch().await?;
        self.store(ip.clone());
        info!(ip = %ip, "public ip address updated");

        let resolver = Arc::clone(self);
        info!("starting address refresh loop");
        tokio::spawn(async move {
            let mut ticker = time::interval(REFRESH_INTERVAL);
            // The initial fetch above already happened; skip the immediate tick.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match resolver.fetch().await {
                            Ok(ip) => {
                                resolver.store(ip.clone());
                                debug!(ip = %ip, "public ip address updated");
                            }
                            // Keep the last known good value on any failure.
                            Err(e) => error!("refresh public ip: {}", e),
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("address resolver shutting down");
                        return;
                    }
                }
            }
        });

        Ok(())
    }

    /// Non-blocking read of the last known good address.
    ///
    /// Empty only if called before `start` completed its first fetch.
    pub fn current_address(&self) -> String {
        self.address.read().expect("address lock poisoned").clone()
    }

    fn store(&self, ip: String) {
        *self.address.write().expect("address lock poisoned") = ip;
    }

    /// Fetches the current public address from the address source.
    async fn fetch(&self) -> Result<String, ResolverError> {
        let resp = self.client.get(&self.endpoint).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ResolverError::Status(status.as_u16()));
        }

        let info: AddressInfo = resp.json().await?;
        if info.ip.is_empty() {
            return Err(ResolverError::EmptyAddress);
        }

        Ok(info.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_populates_address() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"{"ip":"203.0.113.7","country":"US"}"#)
            .create_async()
            .await;

        let resolver = Arc::new(AddressResolver::with_endpoint(&server.url()).unwrap());
        let cancel = CancellationToken::new();
        resolver.start(cancel.clone()).await.unwrap();

        assert_eq!(resolver.current_address(), "203.0.113.7");

        // The cached value survives cancellation.
        cancel.cancel();
        assert_eq!(resolver.current_address(), "203.0.113.7");
    }

    #[tokio::test]
    async fn start_fails_on_empty_address() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"{"ip":""}"#)
            .create_async()
            .await;

        let resolver = Arc::new(AddressResolver::with_endpoint(&server.url()).unwrap());
        let err = resolver.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ResolverError::EmptyAddress));
    }

    #[tokio::test]
    async fn start_fails_on_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let resolver = Arc::new(AddressResolver::with_endpoint(&server.url()).unwrap());
        let err = resolver.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ResolverError::Status(503)));
    }

    #[tokio::test]
    async fn fetch_failure_retains_last_known_good() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"{"ip":"203.0.113.7"}"#)
            .expect(1)
            .create_async()
            .await;

        let resolver = Arc::new(AddressResolver::with_endpoint(&server.url()).unwrap());
        resolver.start(CancellationToken::new()).await.unwrap();

        // Subsequent fetches fail, the stored value must not be cleared.
        let _err = server
            .mock("GET", "/")
            .with_status(500)
            .create_async()
            .await;
        assert!(resolver.fetch().await.is_err());
        assert_eq!(resolver.current_address(), "203.0.113.7");
    }
}
