// src/proxy/registry.rs
use super::backend::{Backend, BackendStatus};
use crate::config::{self, BackendConfig, Strategy};
use crate::load_balancer::{create_load_balancer, LoadBalancer};
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

/// Owns every backend entry plus the process-wide forwarding state. Built
/// once at startup; backends are never added or removed at runtime, only
/// their health and process state transition.
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    by_name: DashMap<String, usize>,
    balancer: ArcSwap<Box<dyn LoadBalancer>>,
    active: AtomicBool,
    strategy_file: PathBuf,
}

impl BackendRegistry {
    pub fn new(
        configs: &[BackendConfig],
        strategy: Strategy,
        strategy_file: PathBuf,
    ) -> Result<Self> {
        let mut backends = Vec::with_capacity(configs.len());
        let by_name = DashMap::new();

        for (index, config) in configs.iter().enumerate() {
            let url = Url::parse(&format!("http://localhost:{}", config.port))
                .with_context(|| format!("invalid port for backend '{}'", config.name))?;
            backends.push(Arc::new(Backend::new(config.name.clone(), url)));
            by_name.insert(config.name.clone(), index);
        }

        Ok(Self {
            backends,
            by_name,
            balancer: ArcSwap::from_pointee(create_load_balancer(strategy)),
            active: AtomicBool::new(true),
            strategy_file,
        })
    }

    pub fn all_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn get_backend(&self, name: &str) -> Option<Arc<Backend>> {
        self.by_name
            .get(name)
            .map(|index| self.backends[*index].clone())
    }

    /// Snapshot of the healthy set in configuration order.
    pub fn healthy_backends(&self) -> Vec<Arc<Backend>> {
        self.backends
            .iter()
            .filter(|b| b.is_healthy())
            .cloned()
            .collect()
    }

    pub fn balancer(&self) -> Arc<Box<dyn LoadBalancer>> {
        self.balancer.load_full()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.balancer.load().name()
    }

    /// Rewrite the persisted selection, then swap the active balancer.
    /// Persisting first keeps the in-memory strategy untouched when the
    /// write fails, so the error reported to the caller matches the state.
    pub async fn set_strategy(&self, strategy: Strategy) -> Result<()> {
        config::save_strategy(&self.strategy_file, strategy).await?;
        self.balancer
            .store(Arc::new(create_load_balancer(strategy)));
        tracing::info!(strategy = strategy.as_str(), "load balancing strategy changed");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.active.store(false, Ordering::SeqCst);
        tracing::info!("forwarding paused");
    }

    pub fn resume(&self) {
        self.active.store(true, Ordering::SeqCst);
        tracing::info!("forwarding resumed");
    }

    pub async fn status(&self) -> Vec<BackendStatus> {
        let mut rows = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            rows.push(backend.status().await);
        }
        rows
    }
}
