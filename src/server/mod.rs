// src/server/mod.rs
pub mod handler;
mod server;

pub use handler::RequestHandler;
pub use server::ProxyServer;
