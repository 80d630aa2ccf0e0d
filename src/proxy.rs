//! Proxy server implementation
//! Accepts inbound HTTP/1.1 requests and hands each one to the `ProxyEngine`

use crate::decode::ProxyResult;
use crate::engine::ProxyEngine;
use crate::error::ProxyError;
use crate::translate::{is_forwarded_method, InboundRequest};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Largest inbound body accepted, in bytes
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// Proxy server configuration
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub port: u16,
    pub upstream_timeout: Option<Duration>,
    pub max_request_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            upstream_timeout: None,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

/// Proxy server
pub struct ProxyServer {
    config: ProxyConfig,
    engine: Arc<ProxyEngine>,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: ProxyConfig, engine: ProxyEngine) -> Self {
        let engine = engine.with_timeout(config.upstream_timeout);
        Self {
            config,
            engine: Arc::new(engine),
        }
    }

    /// Bind the configured port on all interfaces and serve
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("HTTP server listening on {}", listener.local_addr()?);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = self.clone();

            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, remote_addr).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single HTTP connection
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let server = self.clone();
                    async move { server.handle_request(req, remote_addr).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Handle incoming request
    async fn handle_request(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
        debug!("{} {} from {}", req.method(), req.uri(), remote_addr);

        match self.process_request(req).await {
            Ok(result) => Ok(Self::proxy_response(result)),
            Err(e) => {
                error!("Request error: {}", e);
                let status = e.status();
                Ok(Self::error_response(
                    status,
                    status.canonical_reason().unwrap_or("Error"),
                ))
            }
        }
    }

    /// Read the inbound request and forward it
    async fn process_request(&self, req: Request<Incoming>) -> Result<ProxyResult, ProxyError> {
        let inbound = self.read_request(req).await?;
        self.engine.handle(inbound).await
    }

    /// Collect an inbound request into an `InboundRequest`, enforcing the body limit
    async fn read_request(&self, req: Request<Incoming>) -> Result<InboundRequest, ProxyError> {
        if !is_forwarded_method(req.method()) {
            return Err(ProxyError::MethodNotAllowed(req.method().clone()));
        }

        let (parts, body) = req.into_parts();
        let limit = self.config.max_request_size;

        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(ProxyError::BodyTooLarge { limit });
            }
            Err(e) => return Err(ProxyError::Body(e.to_string())),
        };

        Ok(InboundRequest {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(|q| q.to_string()),
            headers: parts.headers,
            body,
        })
    }

    /// Write a decoded upstream response back to the caller
    fn proxy_response(result: ProxyResult) -> Response<BoxBody<Bytes, hyper::Error>> {
        let content_type = result
            .media_type
            .header_value()
            .and_then(|value| HeaderValue::from_str(value).ok());

        let mut response = Response::new(Self::full_body(result.body.into_bytes()));
        *response.status_mut() = result.status;
        if let Some(content_type) = content_type {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response
    }

    /// Create error response
    fn error_response(status: StatusCode, message: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
        let mut response = Response::new(Self::full_body(Bytes::from(message.to_string())));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response
    }

    /// Create full body
    fn full_body(bytes: Bytes) -> BoxBody<Bytes, hyper::Error> {
        Full::new(bytes)
            .map_err(|never| match never {})
            .boxed()
    }
}
