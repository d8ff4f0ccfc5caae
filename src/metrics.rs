//! Prometheus metrics registry and exposition endpoint.
//!
//! Observations produced by the polling loops are recorded through the
//! `MetricsSink` trait so that watchers never touch global metric state;
//! each watcher receives its sink handle at construction. The default sink
//! records into a dedicated `prometheus::Registry` served by an axum HTTP
//! server on the configured host, port 9100, path `/metrics`.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::info;

/// Fixed port the exposition endpoint listens on.
pub const METRICS_PORT: u16 = 9100;

/// Errors from metric registration or the exposition server.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Metric creation or registration failure.
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Bind or serve failure of the exposition endpoint.
    #[error("metrics endpoint: {0}")]
    Serve(#[from] std::io::Error),
}

/// Destination for labeled per-cycle observations.
///
/// Implementations must be safe for concurrent use; every call is an
/// independent write carrying its own labels.
pub trait MetricsSink: Send + Sync {
    /// Records the liveness of a server: 1 for a validated successful cycle,
    /// 0 for any failed or degraded cycle.
    fn record_up(&self, name: &str, endpoint: &str, up: bool);

    /// Records the player count from a validated successful cycle.
    fn record_players(&self, name: &str, endpoint: &str, players: i64);
}

/// `MetricsSink` backed by a Prometheus registry.
pub struct Metrics {
    registry: Registry,
    up: GaugeVec,
    player_count: GaugeVec,
}

impl Metrics {
    /// Creates the registry and registers the exporter's gauges.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Prometheus` on registration failure.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let up = GaugeVec::new(
            Opts::new("up", "Whether the last status query of the server succeeded"),
            &["name", "endpoint"],
        )?;
        registry.register(Box::new(up.clone()))?;

        let player_count = GaugeVec::new(
            Opts::new("player_count", "Current number of players on the server"),
            &["name", "endpoint"],
        )?;
        registry.register(Box::new(player_count.clone()))?;

        Ok(Self {
            registry,
            up,
            player_count,
        })
    }

    /// Renders the current registry contents as Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        // Encoding into a Vec cannot fail for the text format.
        let _ = encoder.encode(&self.registry.gather(), &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Binds the exposition endpoint on `host:9100`.
///
/// Binding happens separately from [`serve`] so a bind failure surfaces
/// before any polling loop starts.
///
/// # Errors
///
/// Returns `MetricsError::Serve` when the address cannot be bound.
pub async fn bind(host: &str) -> Result<TcpListener, MetricsError> {
    let addr = format!("{}:{}", host, METRICS_PORT);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "metrics endpoint listening");
    Ok(listener)
}

impl MetricsSink for Metrics {
    fn record_up(&self, name: &str, endpoint: &str, up: bool) {
        self.up
            .with_label_values(&[name, endpoint])
            .set(if up { 1.0 } else { 0.0 });
    }

    fn record_players(&self, name: &str, endpoint: &str, players: i64) {
        self.player_count
            .with_label_values(&[name, endpoint])
            .set(players as f64);
    }
}

/// Serves the `/metrics` exposition endpoint until the server fails.
///
/// # Errors
///
/// Returns `MetricsError::Serve` if the server stops serving; the caller
/// treats this as fatal for the whole process.
pub async fn serve(listener: TcpListener, metrics: Arc<Metrics>) -> Result<(), MetricsError> {
    let app = Router::new()
        .route("/metrics", get(handle_metrics))
        .with_state(metrics);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (StatusCode::OK, metrics.render())
}
