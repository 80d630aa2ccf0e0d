//! Per-request orchestration: route, translate, send, decode

use crate::decode::{decode, ProxyResult};
use crate::destination::DestinationTable;
use crate::error::ProxyError;
use crate::router::resolve;
use crate::translate::{translate, InboundRequest, OutboundRequest};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, LOCATION};
use hyper::{StatusCode, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Shared outbound client, plain HTTP and TLS upstreams
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Build the shared outbound client.
///
/// HTTP/1.1 with keep-alive pooling. Response bodies are left as the
/// upstream sent them so the decoder owns content-encoding.
pub fn build_client() -> UpstreamClient {
    Client::builder(TokioExecutor::new()).build(HttpsConnector::new())
}

/// Forwards inbound requests using a fixed table and one shared client
#[derive(Clone)]
pub struct ProxyEngine {
    table: Arc<DestinationTable>,
    client: UpstreamClient,
    timeout: Option<Duration>,
}

impl ProxyEngine {
    pub fn new(table: DestinationTable, client: UpstreamClient) -> Self {
        Self {
            table: Arc::new(table),
            client,
            timeout: None,
        }
    }

    /// Bound each upstream exchange; elapsed calls fail with `ProxyError::Timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn table(&self) -> &DestinationTable {
        &self.table
    }

    /// Forward one request and decode what comes back
    pub async fn handle(&self, inbound: InboundRequest) -> Result<ProxyResult, ProxyError> {
        let target = resolve(&self.table, &inbound.path, inbound.query.as_deref());
        info!("{} {} -> {}", inbound.method, inbound.path_and_query(), target);

        let uri: Uri = target.parse().map_err(|source| ProxyError::InvalidUri {
            uri: target.clone(),
            source,
        })?;

        let exchange = self.exchange(translate(&inbound, uri));
        let (status, headers, body) = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| ProxyError::Timeout {
                    uri: target.clone(),
                })??,
            None => exchange.await?,
        };

        debug!("{} answered {} with {} bytes", target, status, body.len());

        Ok(decode(status, &headers, body))
    }

    /// Send `outbound`, following redirects, and collect the final response
    async fn exchange(
        &self,
        mut outbound: OutboundRequest,
    ) -> Result<(StatusCode, HeaderMap, Bytes), ProxyError> {
        let origin = outbound.uri.to_string();

        for _ in 0..=MAX_REDIRECTS {
            let uri = outbound.uri.to_string();
            let response = self
                .client
                .request(outbound.clone().into_request())
                .await
                .map_err(|source| ProxyError::Upstream {
                    uri: uri.clone(),
                    source,
                })?;

            let status = response.status();
            if status.is_redirection() {
                if let Some(location) = response.headers().get(LOCATION) {
                    if let Some(next) = outbound.clone().follow_redirect(status, location) {
                        debug!("{} redirected {} to {}", uri, status, next.uri);
                        outbound = next;
                        continue;
                    }
                }
            }

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|source| ProxyError::UpstreamBody { uri, source })?
                .to_bytes();

            return Ok((parts.status, parts.headers, body));
        }

        Err(ProxyError::TooManyRedirects { uri: origin })
    }
}
