// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::Arc;

/// A selection policy over the current healthy set.
///
/// `select` picks a backend from the snapshot and increments its
/// active-request counter as its single side effect; it never mutates
/// health. Returns `None` when the snapshot is empty.
#[async_trait]
pub trait LoadBalancer: Send + Sync {
    async fn select(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}
