// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
        }
        buffer
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub rejected_total: IntCounterVec,

    // Backend metrics
    pub backend_health_status: IntGaugeVec,
    pub backend_active_requests: IntGaugeVec,

    // System metrics
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("proxy_requests_total", "Forward attempts per backend"),
            &["backend", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new(
                "proxy_rejected_total",
                "Requests refused before any backend was touched",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "proxy_backend_health_status",
                "Backend health (1=healthy, 0=unhealthy)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let backend_active_requests = IntGaugeVec::new(
            Opts::new(
                "proxy_backend_active_requests",
                "In-flight requests per backend",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_active_requests.clone()))?;

        let healthy_backends =
            IntGauge::new("proxy_healthy_backends", "Number of healthy backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends =
            IntGauge::new("proxy_total_backends", "Total number of configured backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            requests_total,
            rejected_total,
            backend_health_status,
            backend_active_requests,
            healthy_backends,
            total_backends,
        })
    }

    pub fn record_forward(&self, backend: &str, outcome: &str) {
        self.requests_total
            .with_label_values(&[backend, outcome])
            .inc();
    }

    pub fn record_rejected(&self, reason: &str) {
        self.rejected_total.with_label_values(&[reason]).inc();
    }

    pub fn update_backend_health(&self, backend: &str, healthy: bool) {
        self.backend_health_status
            .with_label_values(&[backend])
            .set(if healthy { 1 } else { 0 });
    }

    pub fn update_backend_active(&self, backend: &str, active: usize) {
        self.backend_active_requests
            .with_label_values(&[backend])
            .set(active as i64);
    }

    pub fn update_backend_counts(&self, healthy: usize, total: usize) {
        self.healthy_backends.set(healthy as i64);
        self.total_backends.set(total as i64);
    }
}
