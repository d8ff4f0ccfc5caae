//! Supervisor for all polling loops.
//!
//! The supervisor starts the metrics exposition server first, then spawns one
//! `TargetWatcher` task per configured server and blocks until every watcher
//! has observed cancellation and exited. Watchers never return errors across
//! the loop boundary; the only fatal runtime condition is the metrics server
//! dying, which is escalated by cancelling the shared token so all loops
//! drain, and then reported to the caller.

use std::{io, sync::Arc, time::Duration};

use tokio::{
    net::TcpListener,
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    client::StatusQuery,
    config::Server,
    core::watcher::TargetWatcher,
    metrics::{self, Metrics, MetricsError, MetricsSink},
    resolver::AddressResolver,
};

/// Fatal runtime failures that force the whole process down.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The metrics endpoint failed to serve after it had started.
    #[error("metrics endpoint failed: {0}")]
    Metrics(#[from] MetricsError),
}

/// Launches and joins the per-server polling loops.
pub struct Supervisor {
    client: Arc<dyn StatusQuery>,
    resolver: Option<Arc<AddressResolver>>,
    metrics: Arc<Metrics>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        client: Arc<dyn StatusQuery>,
        resolver: Option<Arc<AddressResolver>>,
        metrics: Arc<Metrics>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            resolver,
            metrics,
            interval,
            cancel,
        }
    }

    /// Runs the exporter until cancellation.
    ///
    /// `listener` is the pre-bound metrics endpoint socket; binding is done
    /// by the caller so that a bind failure aborts startup before any
    /// polling loop exists. Serving starts before the first watcher spawns,
    /// so the first poll cycle already has the endpoint available.
    ///
    /// Returns only after every watcher has exited.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Metrics` if the metrics server stops serving;
    /// the shared token is cancelled and all watchers are drained first.
    pub async fn run(
        self,
        listener: TcpListener,
        servers: Vec<Server>,
    ) -> Result<(), RuntimeError> {
        let serve_task = tokio::spawn(metrics::serve(listener, Arc::clone(&self.metrics)));
        self.supervise(serve_task, servers).await
    }

    /// Spawns and joins the watchers, escalating a metrics-server failure.
    async fn supervise(
        self,
        mut serve_task: JoinHandle<Result<(), MetricsError>>,
        servers: Vec<Server>,
    ) -> Result<(), RuntimeError> {
        info!(
            servers = servers.len(),
            interval = self.interval.as_secs(),
            "starting watchers"
        );

        let mut watchers = JoinSet::new();
        for server in servers {
            let watcher = TargetWatcher::new(
                server,
                Arc::clone(&self.client),
                self.resolver.clone(),
                Arc::clone(&self.metrics) as Arc<dyn MetricsSink>,
                self.interval,
                self.cancel.clone(),
            );
            watchers.spawn(watcher.run());
        }

        let mut fatal: Option<MetricsError> = None;
        loop {
            tokio::select! {
                res = &mut serve_task, if fatal.is_none() => {
                    let err = match res {
                        Ok(Err(e)) => e,
                        Ok(Ok(())) => MetricsError::Serve(io::Error::other(
                            "metrics endpoint exited unexpectedly",
                        )),
                        Err(join) => MetricsError::Serve(io::Error::other(join)),
                    };
                    error!("metrics endpoint failed: {}", err);
                    error!("triggering shutdown");
                    fatal = Some(err);
                    self.cancel.cancel();
                }
                next = watchers.join_next() => {
                    if next.is_none() {
                        break;
                    }
                }
            }
        }

        info!("all watchers stopped");

        if fatal.is_none() {
            serve_task.abort();
        }

        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
