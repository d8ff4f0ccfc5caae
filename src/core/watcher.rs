//! Per-target polling loop.
//!
//! One `TargetWatcher` owns one configured server and polls it on the shared
//! interval until the cancellation token fires. Every cycle is self-contained:
//! resolve the effective address, query, classify, record. A failed cycle is
//! logged and surfaced as `up=0`, never terminates the loop, and never affects
//! other targets.

use std::{sync::Arc, time::Duration};

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{client::StatusQuery, config::Server, metrics::MetricsSink, resolver::AddressResolver};

/// Polls a single server on a fixed interval.
pub struct TargetWatcher {
    server: Server,
    client: Arc<dyn StatusQuery>,
    resolver: Option<Arc<AddressResolver>>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    cancel: CancellationToken,
}

impl TargetWatcher {
    pub fn new(
        server: Server,
        client: Arc<dyn StatusQuery>,
        resolver: Option<Arc<AddressResolver>>,
        sink: Arc<dyn MetricsSink>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            server,
            client,
            resolver,
            sink,
            interval,
            cancel,
        }
    }

    /// Runs the polling loop until cancellation.
    ///
    /// The first poll happens immediately; subsequent polls follow the
    /// configured interval. A cycle that is in flight when cancellation
    /// fires completes its classification before the loop exits.
    pub async fn run(self) {
        let label = self.server.label();
        info!(server = %label, "starting watcher");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await,
                _ = self.cancel.cancelled() => {
                    info!(server = %label, "shutting down");
                    return;
                }
            }
        }
    }

    /// Effective host for this cycle. Servers in override mode read the
    /// resolver's cached address; an empty resolver value falls back to the
    /// static address for this cycle only.
    fn effective_ip(&self) -> String {
        if self.server.override_ip {
            if let Some(resolver) = &self.resolver {
                let ip = resolver.current_address();
                if !ip.is_empty() {
                    return ip;
                }
            }
        }
        self.server.ip.clone()
    }

    /// One poll cycle: query, classify, record.
    async fn poll_once(&self) {
        let ip = self.effective_ip();
        let endpoint = format!("{}:{}", ip, self.server.port);

        match self.client.query(&ip, self.server.port).await {
            Ok(resp) => {
                let status = resp.result;
                if status.name.is_empty() {
                    // The server answered but without a usable identity;
                    // treat the cycle as down.
                    error!(server = %endpoint, "status response has no server name");
                    self.sink.record_up(&self.server.label(), &endpoint, false);
                    return;
                }

                // Labels come from the response itself: the remote source of
                // truth overrides the locally configured name and address.
                let reported = status.endpoint.to_string();
                self.sink.record_up(&status.name, &reported, true);
                self.sink.record_players(&status.name, &reported, status.players);
                debug!(server = %status.name, players = status.players, "player count");
            }
            Err(e) => {
                error!(server = %endpoint, "query: {}", e);
                self.sink.record_up(&self.server.label(), &endpoint, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::sleep;

    use super::*;
    use crate::{
        client::ClientError,
        model::{Endpoint, QueryResponse, ServerStatus},
    };

    #[derive(Default)]
    struct RecordingSink {
        ups: Mutex<Vec<(String, String, bool)>>,
        players: Mutex<Vec<(String, String, i64)>>,
    }

    impl MetricsSink for RecordingSink {
        fn record_up(&self, name: &str, endpoint: &str, up: bool) {
            self.ups
                .lock()
                .unwrap()
                .push((name.into(), endpoint.into(), up));
        }

        fn record_players(&self, name: &str, endpoint: &str, players: i64) {
            self.players
                .lock()
                .unwrap()
                .push((name.into(), endpoint.into(), players));
        }
    }

    enum Reply {
        Status(ServerStatus),
        Fail,
    }

    struct MockQuery {
        reply: Reply,
        seen: Mutex<Vec<String>>,
    }

    impl MockQuery {
        fn ok(status: ServerStatus) -> Self {
            Self {
                reply: Reply::Status(status),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Reply::Fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StatusQuery for MockQuery {
        async fn query(&self, ip: &str, port: u32) -> Result<QueryResponse, ClientError> {
            self.seen.lock().unwrap().push(format!("{}:{}", ip, port));
            match &self.reply {
                Reply::Status(s) => Ok(QueryResponse { result: s.clone() }),
                Reply::Fail => Err(ClientError::Status(504)),
            }
        }
    }

    fn target(name: &str, override_ip: bool) -> Server {
        Server {
            name: name.into(),
            ip: "10.0.0.1".into(),
            port: 2302,
            override_ip,
        }
    }

    fn watcher(
        server: Server,
        client: Arc<MockQuery>,
        sink: Arc<RecordingSink>,
        cancel: CancellationToken,
    ) -> TargetWatcher {
        TargetWatcher::new(
            server,
            client,
            None,
            sink,
            Duration::from_millis(50),
            cancel,
        )
    }

    #[tokio::test]
    async fn successful_cycle_uses_response_labels() {
        let client = Arc::new(MockQuery::ok(ServerStatus {
            name: "Deer Isle".into(),
            players: 12,
            max_players: 60,
            endpoint: Endpoint {
                ip: "10.0.0.1".into(),
                port: 2302,
            },
        }));
        let sink = Arc::new(RecordingSink::default());

        let w = watcher(
            target("A", false),
            Arc::clone(&client),
            Arc::clone(&sink),
            CancellationToken::new(),
        );
        w.poll_once().await;

        let ups = sink.ups.lock().unwrap();
        assert_eq!(
            ups.as_slice(),
            &[("Deer Isle".to_string(), "10.0.0.1:2302".to_string(), true)]
        );
        let players = sink.players.lock().unwrap();
        assert_eq!(
            players.as_slice(),
            &[("Deer Isle".to_string(), "10.0.0.1:2302".to_string(), 12)]
        );
    }

    #[tokio::test]
    async fn failed_query_records_down_with_configured_labels() {
        let client = Arc::new(MockQuery::failing());
        let sink = Arc::new(RecordingSink::default());

        let w = watcher(
            target("A", false),
            Arc::clone(&client),
            Arc::clone(&sink),
            CancellationToken::new(),
        );
        w.poll_once().await;

        let ups = sink.ups.lock().unwrap();
        assert_eq!(
            ups.as_slice(),
            &[("A".to_string(), "10.0.0.1:2302".to_string(), false)]
        );
        assert!(sink.players.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_name_response_is_degraded() {
        let client = Arc::new(MockQuery::ok(ServerStatus {
            players: 7,
            ..Default::default()
        }));
        let sink = Arc::new(RecordingSink::default());

        // Without a configured name the label falls back to ip:port.
        let w = watcher(
            target("", false),
            Arc::clone(&client),
            Arc::clone(&sink),
            CancellationToken::new(),
        );
        w.poll_once().await;

        let ups = sink.ups.lock().unwrap();
        assert_eq!(
            ups.as_slice(),
            &[("10.0.0.1:2302".to_string(), "10.0.0.1:2302".to_string(), false)]
        );
        assert!(sink.players.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn override_without_resolver_value_falls_back_to_static_ip() {
        let client = Arc::new(MockQuery::failing());
        let sink = Arc::new(RecordingSink::default());

        // override_ip set, but no resolver handle at all: the static address
        // must be used for the cycle.
        let w = watcher(
            target("A", true),
            Arc::clone(&client),
            Arc::clone(&sink),
            CancellationToken::new(),
        );
        w.poll_once().await;

        assert_eq!(client.seen.lock().unwrap().as_slice(), &["10.0.0.1:2302"]);
    }

    #[tokio::test]
    async fn override_with_empty_resolver_falls_back_for_the_cycle() {
        let client = Arc::new(MockQuery::failing());
        let sink = Arc::new(RecordingSink::default());

        // Resolver constructed but never started: its cached value is empty.
        let resolver = Arc::new(AddressResolver::with_endpoint("http://127.0.0.1:9").unwrap());

        let w = TargetWatcher::new(
            target("A", true),
            Arc::clone(&client) as Arc<dyn StatusQuery>,
            Some(resolver),
            Arc::clone(&sink) as Arc<dyn MetricsSink>,
            Duration::from_millis(50),
            CancellationToken::new(),
        );
        w.poll_once().await;

        assert_eq!(client.seen.lock().unwrap().as_slice(), &["10.0.0.1:2302"]);
    }

    #[tokio::test]
    async fn override_uses_resolved_address_when_available() {
        let mut api = mockito::Server::new_async().await;
        let _m = api
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"{"ip":"203.0.113.7"}"#)
            .create_async()
            .await;

        let resolver = Arc::new(AddressResolver::with_endpoint(&api.url()).unwrap());
        resolver.start(CancellationToken::new()).await.unwrap();

        let client = Arc::new(MockQuery::failing());
        let sink = Arc::new(RecordingSink::default());

        let w = TargetWatcher::new(
            target("A", true),
            Arc::clone(&client) as Arc<dyn StatusQuery>,
            Some(resolver),
            Arc::clone(&sink) as Arc<dyn MetricsSink>,
            Duration::from_millis(50),
            CancellationToken::new(),
        );
        w.poll_once().await;

        assert_eq!(client.seen.lock().unwrap().as_slice(), &["203.0.113.7:2302"]);
        // Failure labeling follows the effective endpoint of the cycle.
        let ups = sink.ups.lock().unwrap();
        assert_eq!(
            ups.as_slice(),
            &[("A".to_string(), "203.0.113.7:2302".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let client = Arc::new(MockQuery::failing());
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();

        let w = watcher(
            target("A", false),
            Arc::clone(&client),
            Arc::clone(&sink),
            cancel.clone(),
        );
        let handle = tokio::spawn(w.run());

        sleep(Duration::from_millis(120)).await;
        cancel.cancel();
        handle.await.unwrap();

        let polled = sink.ups.lock().unwrap().len();
        assert!(polled >= 1, "should have polled at least once");

        // No further observations after the loop exited.
        sleep(Duration::from_millis(120)).await;
        assert_eq!(sink.ups.lock().unwrap().len(), polled);
    }
}
