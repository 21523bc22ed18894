// src/proxy/gateway.rs
use super::backend::ActiveRequestGuard;
use super::registry::BackendRegistry;
use crate::metrics::MetricsCollector;
use futures::StreamExt;
use hyper::client::HttpConnector;
use hyper::header::{HeaderValue, HOST};
use hyper::{Body, Client, Request, Response, StatusCode, Uri};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-request entry point: gate check, selection, URI rewrite, forward,
/// guaranteed release of the in-flight slot.
pub struct ProxyGateway {
    registry: Arc<BackendRegistry>,
    client: Client<HttpConnector>,
    metrics: Arc<MetricsCollector>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Forwarding is paused")]
    Paused,

    #[error("No healthy backend available")]
    NoHealthyBackends,

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] hyper::Error),

    #[error("Failed to rewrite request: {0}")]
    Rewrite(#[from] hyper::http::Error),
}

impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let status = match err {
            ProxyError::Paused | ProxyError::NoHealthyBackends => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Rewrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Response::builder()
            .status(status)
            .body(Body::from(err.to_string()))
            .unwrap_or_else(|_| {
                let mut resp = Response::new(Body::empty());
                *resp.status_mut() = status;
                resp
            })
    }
}

impl ProxyGateway {
    pub fn new(registry: Arc<BackendRegistry>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            registry,
            client: Client::new(),
            metrics,
        }
    }

    /// Forward one request. The selected backend's slot is released when the
    /// proxied response body finishes streaming, or immediately on any error
    /// path, via the guard's `Drop`.
    pub async fn handle(&self, mut req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        if !self.registry.is_active() {
            self.metrics.record_rejected("paused");
            return Err(ProxyError::Paused);
        }

        let healthy = self.registry.healthy_backends();
        let backend = self
            .registry
            .balancer()
            .select(&healthy)
            .await
            .ok_or_else(|| {
                self.metrics.record_rejected("no_healthy_backend");
                ProxyError::NoHealthyBackends
            })?;
        // Selection already claimed the slot; from here the guard releases it.
        let guard = ActiveRequestGuard::new(backend.clone());

        let request_id = Uuid::new_v4();
        rewrite_request(&mut req, backend.authority())?;
        debug!(%request_id, backend = %backend.name, uri = %req.uri(), "forwarding request");

        let upstream = match self.client.request(req).await {
            Ok(resp) => resp,
            Err(e) => {
                // Health is left untouched; only the next probe cycle may
                // flip it. The guard drops here and releases the slot.
                self.metrics.record_forward(&backend.name, "upstream_error");
                return Err(ProxyError::Upstream(e));
            }
        };

        self.metrics.record_forward(&backend.name, "forwarded");
        info!(
            %request_id,
            backend = %backend.name,
            host = %backend.authority(),
            status = %upstream.status(),
            "request forwarded"
        );

        // Stream the upstream body through untouched, keeping the guard
        // alive inside the stream so the release fires when the body is
        // exhausted or the client goes away.
        let (parts, body) = upstream.into_parts();
        let body = Body::wrap_stream(body.map(move |chunk| {
            let _held = &guard;
            chunk
        }));

        Ok(Response::from_parts(parts, body))
    }
}

/// Point the request at the chosen backend: swap scheme and authority, keep
/// method, headers and body verbatim, and drop the `/proxy` route prefix.
fn rewrite_request(req: &mut Request<Body>, authority: &str) -> Result<(), hyper::http::Error> {
    let path = req.uri().path();
    let stripped = path.strip_prefix("/proxy").unwrap_or(path);
    let stripped = if stripped.is_empty() { "/" } else { stripped };

    let path_and_query = match req.uri().query() {
        Some(query) => format!("{}?{}", stripped, query),
        None => stripped.to_string(),
    };

    let uri = Uri::builder()
        .scheme("http")
        .authority(authority)
        .path_and_query(path_and_query)
        .build()?;

    let host = HeaderValue::from_str(authority).map_err(hyper::http::Error::from)?;
    req.headers_mut().insert(HOST, host);
    *req.uri_mut() = uri;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_strips_proxy_prefix_and_sets_host() {
        let mut req = Request::builder()
            .method("POST")
            .uri("http://127.0.0.1:8080/proxy/api/items?limit=5")
            .body(Body::empty())
            .unwrap();

        rewrite_request(&mut req, "localhost:9001").unwrap();

        assert_eq!(req.uri().to_string(), "http://localhost:9001/api/items?limit=5");
        assert_eq!(req.headers().get(HOST).unwrap(), "localhost:9001");
    }

    #[test]
    fn rewrite_bare_prefix_becomes_root() {
        let mut req = Request::builder()
            .uri("http://127.0.0.1:8080/proxy")
            .body(Body::empty())
            .unwrap();

        rewrite_request(&mut req, "localhost:9001").unwrap();

        assert_eq!(req.uri().path(), "/");
    }
}
