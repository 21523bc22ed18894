// src/proxy/backend.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{Mutex, RwLock};
use url::Url;

#[derive(Debug)]
pub struct Backend {
    pub name: String,
    pub url: Url,

    // "host:port" the prober dials and the gateway forwards to
    authority: String,

    // Runtime state
    healthy: AtomicBool,
    last_seen: RwLock<Option<DateTime<Utc>>>,
    active_requests: AtomicUsize,
    process: Mutex<Option<Child>>,
}

/// Status row returned by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub host: String,
    pub healthy: bool,
    pub last_seen: Option<String>,
    pub active_requests: usize,
}

impl Backend {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        let authority = format!(
            "{}:{}",
            url.host_str().unwrap_or("localhost"),
            url.port_or_known_default().unwrap_or(80)
        );

        Self {
            name: name.into(),
            url,
            authority,
            healthy: AtomicBool::new(false),
            last_seen: RwLock::new(None),
            active_requests: AtomicUsize::new(0),
            process: Mutex::new(None),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Set by the health monitor on a successful probe.
    pub async fn mark_healthy(&self, at: DateTime<Utc>) {
        self.healthy.store(true, Ordering::SeqCst);
        *self.last_seen.write().await = Some(at);
    }

    /// Set by the health monitor on a failed probe, or by the process manager
    /// on an explicit stop.
    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }

    /// Claim an in-flight slot. Callers must pair this with exactly one
    /// `end_request`, normally by holding an [`ActiveRequestGuard`].
    pub fn begin_request(&self) {
        self.active_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_request(&self) {
        self.active_requests.fetch_sub(1, Ordering::SeqCst);
    }

    pub async fn attach_process(&self, child: Child) {
        *self.process.lock().await = Some(child);
    }

    pub async fn detach_process(&self) -> Option<Child> {
        self.process.lock().await.take()
    }

    pub async fn has_process(&self) -> bool {
        self.process.lock().await.is_some()
    }

    pub async fn status(&self) -> BackendStatus {
        BackendStatus {
            name: self.name.clone(),
            host: self.authority.clone(),
            healthy: self.is_healthy(),
            last_seen: self.last_seen.read().await.map(|t| t.to_rfc3339()),
            active_requests: self.active_requests(),
        }
    }
}

/// Owns one in-flight slot on a backend, claimed at selection time by the
/// load balancer. The decrement runs in `Drop`, so it fires exactly once no
/// matter how the request ends, including a client disconnect mid-stream.
pub struct ActiveRequestGuard {
    backend: Arc<Backend>,
}

impl ActiveRequestGuard {
    /// Adopt a slot that was already incremented during selection.
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.backend.end_request();
    }
}
