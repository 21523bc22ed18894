// tests/control_surface_tests.rs
use hyper::{Body, Method, Request, Response, StatusCode};
use managed_proxy::config::{BackendConfig, ProgramConfig, Strategy};
use managed_proxy::metrics::MetricsRegistry;
use managed_proxy::process::ProcessManager;
use managed_proxy::proxy::{BackendRegistry, ProxyGateway};
use managed_proxy::server::RequestHandler;
use std::path::PathBuf;
use std::sync::Arc;
use tower::Service;

fn strategy_path() -> PathBuf {
    std::env::temp_dir().join(format!("managed-proxy-ctl-{}.json", uuid::Uuid::new_v4()))
}

fn make_handler(ports: &[u16]) -> RequestHandler {
    let configs: Vec<BackendConfig> = ports
        .iter()
        .enumerate()
        .map(|(i, port)| BackendConfig {
            name: format!("b{}", i),
            port: *port,
        })
        .collect();
    let registry =
        Arc::new(BackendRegistry::new(&configs, Strategy::RoundRobin, strategy_path()).unwrap());

    let metrics_registry = Arc::new(MetricsRegistry::new().unwrap());
    let gateway = Arc::new(ProxyGateway::new(
        registry.clone(),
        metrics_registry.collector(),
    ));
    let program = ProgramConfig {
        binary: PathBuf::from("/bin/sleep"),
        args: vec!["300".to_string()],
        build_command: Vec::new(),
        build_dir: None,
    };
    let manager = Arc::new(ProcessManager::new(registry.clone(), program));

    RequestHandler::new(gateway, registry, manager, metrics_registry)
}

async fn call(handler: &mut RequestHandler, method: Method, uri: &str, body: Body) -> Response<Body> {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    handler.call(req).await.unwrap()
}

async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn pause_resume_toggles_gate_state() {
    let mut handler = make_handler(&[9001]);

    let resp = call(&mut handler, Method::GET, "/state", Body::empty()).await;
    assert_eq!(body_json(resp).await["state"], "active");

    let resp = call(&mut handler, Method::POST, "/pause", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&mut handler, Method::GET, "/state", Body::empty()).await;
    assert_eq!(body_json(resp).await["state"], "paused");

    // While paused, forwarding is refused before any backend is touched.
    let resp = call(&mut handler, Method::GET, "/proxy/x", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resp = call(&mut handler, Method::POST, "/resume", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&mut handler, Method::GET, "/state", Body::empty()).await;
    assert_eq!(body_json(resp).await["state"], "active");
}

#[tokio::test]
async fn strategy_endpoint_reads_and_updates() {
    let mut handler = make_handler(&[9001]);

    let resp = call(&mut handler, Method::GET, "/strategy", Body::empty()).await;
    assert_eq!(body_json(resp).await["strategy"], "round_robin");

    let resp = call(
        &mut handler,
        Method::POST,
        "/strategy",
        Body::from(r#"{"strategy":"least_connections"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["strategy"], "least_connections");

    let resp = call(&mut handler, Method::GET, "/strategy", Body::empty()).await;
    assert_eq!(body_json(resp).await["strategy"], "least_connections");
}

#[tokio::test]
async fn invalid_strategy_value_is_a_bad_request() {
    let mut handler = make_handler(&[9001]);

    let resp = call(
        &mut handler,
        Method::POST,
        "/strategy",
        Body::from(r#"{"strategy":"fastest"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_lists_every_configured_backend() {
    let mut handler = make_handler(&[9001, 9002]);

    let resp = call(&mut handler, Method::GET, "/status", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let rows = body_json(resp).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "b0");
    assert_eq!(rows[0]["host"], "localhost:9001");
    assert_eq!(rows[0]["healthy"], false);
    assert_eq!(rows[0]["active_requests"], 0);
    assert_eq!(rows[1]["name"], "b1");
}

#[tokio::test]
async fn start_and_stop_validate_their_target() {
    let mut handler = make_handler(&[9001]);

    let resp = call(&mut handler, Method::POST, "/start", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = call(&mut handler, Method::POST, "/start?name=ghost", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = call(&mut handler, Method::POST, "/stop?name=b0", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = call(&mut handler, Method::POST, "/start?name=b0", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&mut handler, Method::POST, "/stop?name=b0", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let mut handler = make_handler(&[9001]);

    let resp = call(&mut handler, Method::GET, "/metrics", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"],
        "text/plain; version=0.0.4"
    );
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let mut handler = make_handler(&[9001]);

    let resp = call(&mut handler, Method::GET, "/nope", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
