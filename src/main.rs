use std::{process, sync::Arc, time::Duration};

use gsmon::{
    client::{LauncherClient, StatusQuery},
    config::Config,
    core::Supervisor,
    logger::LoggerManager,
    metrics::{self, Metrics},
    print_error,
    resolver::AddressResolver,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cfg = Config::new().unwrap_or_else(|e| {
        print_error!("{}", e);
        process::exit(1);
    });

    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });

    info!("Starting gsmon version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);

    let client: Arc<dyn StatusQuery> = Arc::new(LauncherClient::new().unwrap_or_else(|e| {
        error!("Failed to construct status client: {}", e);
        process::exit(1);
    }));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C — initiating graceful shutdown...");
                cancel.cancel();
            }
        });
    }

    // The resolver is only started when some server runs in override mode;
    // its first fetch must succeed before any watcher starts.
    let resolver = if cfg.needs_resolver() {
        let resolver = Arc::new(AddressResolver::new().unwrap_or_else(|e| {
            error!("Failed to construct address resolver: {}", e);
            process::exit(1);
        }));
        resolver.start(cancel.clone()).await.unwrap_or_else(|e| {
            error!("Failed to resolve public address: {}", e);
            process::exit(1);
        });
        Some(resolver)
    } else {
        None
    };

    let metrics = Arc::new(Metrics::new().unwrap_or_else(|e| {
        error!("Failed to register metrics: {}", e);
        process::exit(1);
    }));

    let listener = metrics::bind(&cfg.host).await.unwrap_or_else(|e| {
        error!("Failed to bind metrics endpoint: {}", e);
        process::exit(1);
    });

    let supervisor = Supervisor::new(
        client,
        resolver,
        Arc::clone(&metrics),
        Duration::from_secs(cfg.interval),
        cancel.clone(),
    );

    match supervisor.run(listener, cfg.servers.clone()).await {
        Ok(()) => {
            info!("Shutdown complete");
        }
        Err(e) => {
            error!("Runtime failure: {}", e);
            process::exit(1);
        }
    }
}
