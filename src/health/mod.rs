// src/health/mod.rs
mod monitor;

pub use monitor::{HealthMonitor, PROBE_PERIOD, PROBE_TIMEOUT};
