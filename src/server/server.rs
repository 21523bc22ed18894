// src/server/server.rs
use crate::server::handler::RequestHandler;
use anyhow::Result;
use hyper::server::conn::Http;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Accept loop for the proxy listener; one Tokio task per connection.
pub struct ProxyServer {
    addr: SocketAddr,
    handler: RequestHandler,
}

impl ProxyServer {
    pub fn new(addr: SocketAddr, handler: RequestHandler) -> Self {
        Self { addr, handler }
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("reverse proxy listening on {}", self.addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let svc = self.handler.clone();

            tokio::spawn(async move {
                if let Err(err) = Http::new().serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }
    }
}
