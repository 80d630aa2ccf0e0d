//! Integration tests for locurlfwd
//!
//! Runs a real proxy server in front of plain hyper backends and talks to it
//! over HTTP:
//! - Prefix routing (inclusive, exclusive, default)
//! - Body forwarding
//! - Response decoding
//! - Inbound limits and unsupported methods

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use locurlfwd::{build_client, DestinationTable, ProxyConfig, ProxyEngine, ProxyServer};
use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Simple backend that echoes what it received
async fn run_backend_server(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| async move {
                    let method = req.method().clone();
                    let path_and_query = req
                        .uri()
                        .path_and_query()
                        .map(|pq| pq.as_str().to_string())
                        .unwrap_or_default();
                    let body = req.into_body().collect().await.unwrap().to_bytes();

                    let response_text = format!(
                        "{}|{} {}|body={}",
                        name,
                        method,
                        path_and_query,
                        String::from_utf8_lossy(&body)
                    );

                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(200)
                            .header("content-type", "text/plain")
                            .body(Full::new(Bytes::from(response_text)))
                            .unwrap(),
                    )
                });

                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    addr
}

/// Backend that always answers with a gzip-compressed page
async fn run_gzip_backend(page: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(page.as_bytes()).unwrap();
    let compressed = Bytes::from(encoder.finish().unwrap());

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let compressed = compressed.clone();

            tokio::spawn(async move {
                let service = service_fn(move |_req: Request<Incoming>| {
                    let compressed = compressed.clone();
                    async move {
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(200)
                                .header("content-type", "text/html; charset=UTF-8")
                                .header("content-encoding", "gzip")
                                .body(Full::new(compressed))
                                .unwrap(),
                        )
                    }
                });

                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    addr
}

/// Start a proxy on an ephemeral port and return its address
async fn setup_proxy(specs: Vec<String>, config: ProxyConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let table = DestinationTable::build(addr.port(), &specs).unwrap();
    let engine = ProxyEngine::new(table, build_client());
    let server = Arc::new(ProxyServer::new(config, engine));

    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    addr
}

#[tokio::test]
async fn test_proxy_routes_by_first_segment() {
    let app = run_backend_server("APP").await;
    let api = run_backend_server("API").await;
    let web = run_backend_server("WEB").await;

    let proxy = setup_proxy(
        vec![
            format!("http://{}", app),
            format!("api^http://{}", api),
            format!("web=http://{}/", web),
        ],
        ProxyConfig::default(),
    )
    .await;

    let client = reqwest::Client::new();

    let body = client
        .get(format!("http://{}/api/users?id=7", proxy))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "API|GET /users?id=7|body=");

    let body = client
        .get(format!("http://{}/web/app.js", proxy))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "WEB|GET /web/app.js|body=");

    let body = client
        .get(format!("http://{}/", proxy))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "APP|GET /|body=");
}

#[tokio::test]
async fn test_proxy_forwards_post_body() {
    let app = run_backend_server("APP").await;
    let proxy = setup_proxy(vec![format!("http://{}", app)], ProxyConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/submit", proxy))
        .body("name=widget")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain"
    );
    assert_eq!(
        response.text().await.unwrap(),
        "APP|POST /submit|body=name=widget"
    );
}

#[tokio::test]
async fn test_proxy_decodes_gzip() {
    let page = "<html><body>hello</body></html>";
    let backend = run_gzip_backend(page).await;
    let proxy = setup_proxy(vec![format!("http://{}", backend)], ProxyConfig::default()).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/index.html", proxy))
        .send()
        .await
        .unwrap();

    assert!(response.headers().get("content-encoding").is_none());
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/html; charset=utf-8"
    );
    assert_eq!(response.text().await.unwrap(), page);
}

#[tokio::test]
async fn test_proxy_rejects_unsupported_method() {
    let app = run_backend_server("APP").await;
    let proxy = setup_proxy(vec![format!("http://{}", app)], ProxyConfig::default()).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::TRACE, format!("http://{}/", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 405);
}

#[tokio::test]
async fn test_proxy_rejects_oversized_body() {
    let app = run_backend_server("APP").await;
    let config = ProxyConfig {
        max_request_size: 16,
        ..ProxyConfig::default()
    };
    let proxy = setup_proxy(vec![format!("http://{}", app)], config).await;

    let response = reqwest::Client::new()
        .put(format!("http://{}/upload", proxy))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 413);
}

#[tokio::test]
async fn test_proxy_unreachable_upstream_502() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let proxy = setup_proxy(vec![format!("http://{}", dead)], ProxyConfig::default()).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 502);
}
