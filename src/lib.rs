//! gsmon — game-server status exporter
//!
//! This crate polls a set of remote game-server status endpoints through a
//! launcher-style HTTP query API and republishes derived metrics (player
//! count, liveness) over a pull-based Prometheus endpoint. It is designed
//! for long-running operation: one independent polling loop per configured
//! server, cooperative shutdown through a shared cancellation token, and
//! per-cycle failures that never take down a loop.
//!
//! ## Modules
//!
//! * `config` — Configuration structures, YAML loading, validation, and
//!   defaults. Validation via the `validator` crate.
//!
//! * `model` — Wire model for the launcher status API.
//!
//! * `client` — The `StatusQuery` trait plus the HTTP client used to query
//!   the launcher status API.
//!
//! * `resolver` — Background refresher caching the host's externally visible
//!   address, for servers configured with `override_ip`.
//!
//! * `metrics` — Prometheus registry, the `MetricsSink` handle passed into
//!   each watcher, and the `/metrics` HTTP server.
//!
//! * `core` — The per-target watcher loop and the supervisor that launches,
//!   joins, and shuts down all loops.
//!
//! * `logger` — Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and optional systemd journald integration.

pub mod client;
pub mod config;
pub mod core;
pub mod logger;
pub mod metrics;
pub mod model;
pub mod resolver;
