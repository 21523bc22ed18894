// src/bin/backend.rs
//
// Demo backend served by the proxy: echoes the request path and offers a
// /slow endpoint for holding requests open. The listening port arrives via
// the PORT environment variable, the way the process manager injects it.
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8081);
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    let make_service = make_service_fn(move |_| async move {
        Ok::<_, Infallible>(service_fn(move |req| handle(req, port)))
    });

    println!("backend listening on {}", addr);
    if let Err(e) = Server::bind(&addr).serve(make_service).await {
        eprintln!("backend error on port {}: {}", port, e);
        std::process::exit(1);
    }
}

async fn handle(req: Request<Body>, port: u16) -> Result<Response<Body>, Infallible> {
    if req.uri().path() == "/slow" {
        let millis: u64 = req
            .uri()
            .query()
            .and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == "duration")
                    .and_then(|(_, v)| v.parse().ok())
            })
            .unwrap_or(2000);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        return Ok(Response::new(Body::from(format!(
            "Backend ({}): slow request finished after {}ms\n",
            port, millis
        ))));
    }

    Ok(Response::new(Body::from(format!(
        "Backend ({}): {}\n",
        port,
        req.uri().path()
    ))))
}
