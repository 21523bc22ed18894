// src/proxy/mod.rs
mod backend;
mod gateway;
mod registry;

pub use backend::{ActiveRequestGuard, Backend, BackendStatus};
pub use gateway::{ProxyGateway, ProxyError};
pub use registry::BackendRegistry;
