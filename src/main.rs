// src/main.rs
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use managed_proxy::{
    config,
    health::HealthMonitor,
    metrics::MetricsRegistry,
    process::ProcessManager,
    proxy::{BackendRegistry, ProxyGateway},
    server::{ProxyServer, RequestHandler},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("managed_proxy=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    // Strategy selection survives restarts
    let strategy = config::load_strategy(&config.strategy_file).await?;
    info!("Load balancing strategy: {}", strategy.as_str());

    // Initialize metrics
    let metrics_registry = Arc::new(MetricsRegistry::new()?);
    let metrics = metrics_registry.collector();

    // Build the registry and spawn the configured backends
    let registry = Arc::new(BackendRegistry::new(
        &config.backends,
        strategy,
        config.strategy_file.clone(),
    )?);
    let manager = Arc::new(ProcessManager::new(registry.clone(), config.program.clone()));

    for backend in &config.backends {
        if let Err(e) = manager.start(&backend.name).await {
            // The backend stays stopped but remains startable via /start
            error!("Backend '{}' failed to start: {}", backend.name, e);
        }
    }

    // Start the health monitor
    let monitor = Arc::new(HealthMonitor::new(registry.clone(), Some(metrics.clone())));
    tokio::spawn(monitor.clone().start());

    // Stop probing and kill the children before exiting on SIGINT/SIGTERM
    {
        let manager = manager.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            monitor.shutdown();
            manager.shutdown_all().await;
            std::process::exit(0);
        });
    }

    // Wire the gateway and the control surface, then serve
    let gateway = Arc::new(ProxyGateway::new(registry.clone(), metrics));
    let handler = RequestHandler::new(gateway, registry, manager, metrics_registry);

    let addr: SocketAddr = ([0, 0, 0, 0], config.listen_port).into();
    ProxyServer::new(addr, handler).serve().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
