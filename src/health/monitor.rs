// src/health/monitor.rs
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendRegistry};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, timeout};
use tracing::{info, warn};

pub const PROBE_PERIOD: Duration = Duration::from_secs(3);
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// Background loop that dials every backend once per period and flips its
/// health flag on the outcome. A single failed probe marks a backend
/// unhealthy and a single success restores it; there is deliberately no
/// hysteresis, so eligibility tracks reachability within one period.
pub struct HealthMonitor {
    registry: Arc<BackendRegistry>,
    period: Duration,
    probe_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<BackendRegistry>, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self::with_timing(registry, metrics, PROBE_PERIOD, PROBE_TIMEOUT)
    }

    pub fn with_timing(
        registry: Arc<BackendRegistry>,
        metrics: Option<Arc<MetricsCollector>>,
        period: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Self {
            registry,
            period,
            probe_timeout,
            metrics,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval(self.period);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!("Starting health monitor with period: {:?}", self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// One probe cycle, sequential over the configured backends.
    pub async fn probe_all(&self) {
        for backend in self.registry.all_backends() {
            self.probe(backend).await;
        }

        if let Some(metrics) = &self.metrics {
            let total = self.registry.all_backends().len();
            let healthy = self.registry.healthy_backends().len();
            metrics.update_backend_counts(healthy, total);
        }
    }

    async fn probe(&self, backend: &Arc<Backend>) {
        let addr = backend.authority();
        let was_healthy = backend.is_healthy();

        match timeout(self.probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                backend.mark_healthy(Utc::now()).await;
                if !was_healthy {
                    info!("Backend '{}' ({}) is available again", backend.name, addr);
                }
            }
            // Refused or timed out, same outcome either way
            _ => {
                backend.mark_unhealthy();
                if was_healthy {
                    warn!("Backend '{}' ({}) is not available", backend.name, addr);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(&backend.name, backend.is_healthy());
            metrics.update_backend_active(&backend.name, backend.active_requests());
        }
    }
}
