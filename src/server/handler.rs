// src/server/handler.rs
use crate::config::StrategySelection;
use crate::metrics::MetricsRegistry;
use crate::process::{ProcessError, ProcessManager};
use crate::proxy::{BackendRegistry, ProxyGateway};
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

/// Routes inbound requests: everything under `/proxy` goes through the
/// gateway, the rest is the JSON control surface.
#[derive(Clone)]
pub struct RequestHandler {
    gateway: Arc<ProxyGateway>,
    registry: Arc<BackendRegistry>,
    manager: Arc<ProcessManager>,
    metrics: Arc<MetricsRegistry>,
}

impl RequestHandler {
    pub fn new(
        gateway: Arc<ProxyGateway>,
        registry: Arc<BackendRegistry>,
        manager: Arc<ProcessManager>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            gateway,
            registry,
            manager,
            metrics,
        }
    }

    async fn route(self, req: Request<Body>) -> Response<Body> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if path == "/proxy" || path.starts_with("/proxy/") {
            return match self.gateway.handle(req).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::debug!("proxy request refused: {}", e);
                    e.into()
                }
            };
        }

        match (method, path.as_str()) {
            (Method::GET, "/status") => json(StatusCode::OK, &self.registry.status().await),

            (Method::POST, "/pause") => {
                self.registry.pause();
                control_ok("forwarding paused")
            }
            (Method::POST, "/resume") => {
                self.registry.resume();
                control_ok("forwarding resumed")
            }
            (Method::GET, "/state") => {
                let state = if self.registry.is_active() {
                    "active"
                } else {
                    "paused"
                };
                json(StatusCode::OK, &serde_json::json!({ "state": state }))
            }

            (Method::GET, "/strategy") => json(
                StatusCode::OK,
                &serde_json::json!({ "strategy": self.registry.strategy_name() }),
            ),
            (Method::POST, "/strategy") => self.set_strategy(req).await,

            (Method::POST, "/start") => match query_param(&req, "name") {
                Some(name) => match self.manager.start(&name).await {
                    Ok(()) => message(
                        StatusCode::OK,
                        &format!("Backend '{}' started", name),
                    ),
                    Err(e) => process_error(&e),
                },
                None => message(StatusCode::BAD_REQUEST, "missing 'name' query parameter"),
            },
            (Method::POST, "/stop") => match query_param(&req, "name") {
                Some(name) => match self.manager.stop(&name).await {
                    Ok(()) => message(
                        StatusCode::OK,
                        &format!("Backend '{}' stopped", name),
                    ),
                    Err(e) => process_error(&e),
                },
                None => message(StatusCode::BAD_REQUEST, "missing 'name' query parameter"),
            },

            (Method::GET, "/metrics") => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Body::from(self.metrics.gather()))
                .unwrap(),

            _ => message(StatusCode::NOT_FOUND, "not found"),
        }
    }

    async fn set_strategy(&self, req: Request<Body>) -> Response<Body> {
        let bytes = match hyper::body::to_bytes(req.into_body()).await {
            Ok(bytes) => bytes,
            Err(e) => return message(StatusCode::BAD_REQUEST, &format!("unreadable body: {}", e)),
        };

        let selection: StrategySelection = match serde_json::from_slice(&bytes) {
            Ok(selection) => selection,
            Err(_) => {
                return message(
                    StatusCode::BAD_REQUEST,
                    "expected {\"strategy\": \"round_robin\" | \"least_connections\"}",
                )
            }
        };

        match self.registry.set_strategy(selection.strategy).await {
            Ok(()) => json(
                StatusCode::OK,
                &serde_json::json!({ "strategy": selection.strategy.as_str() }),
            ),
            Err(e) => {
                tracing::error!("failed to persist strategy: {:#}", e);
                message(StatusCode::INTERNAL_SERVER_ERROR, "failed to persist strategy")
            }
        }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.route(req).await) })
    }
}

fn query_param(req: &Request<Body>, key: &str) -> Option<String> {
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(buf) => Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(buf))
            .unwrap(),
        Err(e) => {
            tracing::error!("failed to serialize response: {}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap()
        }
    }
}

fn message(status: StatusCode, text: &str) -> Response<Body> {
    json(status, &serde_json::json!({ "message": text }))
}

fn control_ok(text: &str) -> Response<Body> {
    json(
        StatusCode::OK,
        &serde_json::json!({ "status": "ok", "message": text }),
    )
}

fn process_error(err: &ProcessError) -> Response<Body> {
    let status = match err {
        ProcessError::NotFound(_) | ProcessError::NotRunning(_) => StatusCode::NOT_FOUND,
        ProcessError::Build(_) | ProcessError::Spawn(_) | ProcessError::Kill(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    message(status, &err.to_string())
}
