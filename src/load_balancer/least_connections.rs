// src/load_balancer/least_connections.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Picks the backend with the fewest in-flight requests; exact ties go to the
/// earliest backend in configuration order (first encountered in the scan).
///
/// The scan and the winner's increment run under one lock. Without it, two
/// concurrent selections could both observe the same backend as least loaded
/// and both pick it while an idle peer exists.
pub struct LeastConnectionsBalancer {
    select_lock: Mutex<()>,
}

impl LeastConnectionsBalancer {
    pub fn new() -> Self {
        Self {
            select_lock: Mutex::new(()),
        }
    }
}

impl Default for LeastConnectionsBalancer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoadBalancer for LeastConnectionsBalancer {
    async fn select(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let _guard = self.select_lock.lock().await;

        let mut winner: Option<&Arc<Backend>> = None;
        let mut least = usize::MAX;
        for backend in backends {
            let active = backend.active_requests();
            if active < least {
                least = active;
                winner = Some(backend);
            }
        }

        let backend = winner?.clone();
        backend.begin_request();
        Some(backend)
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }
}
