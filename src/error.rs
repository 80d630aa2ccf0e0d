//! Error types for startup configuration, body decoding and request forwarding

use crate::decode::ContentEncoding;
use hyper::StatusCode;
use thiserror::Error;

/// Fatal configuration problems, reported before any request is served
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate default destination: only one destination may omit a path prefix")]
    DuplicateDefault,

    #[error("no default destination: add a destination without a path prefix")]
    NoDefault,

    #[error("invalid destination URL `{target}`: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("destination URL `{0}` must use http or https")]
    UnsupportedScheme(String),
}

/// A declared content-encoding could not be decoded
#[derive(Debug, Error)]
#[error("failed to decode {encoding} response body: {source}")]
pub struct DecodeError {
    pub encoding: ContentEncoding,
    #[source]
    pub source: std::io::Error,
}

/// Per-request failures, each mapped onto the status the caller receives
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream URI `{uri}`: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("upstream request to {uri} timed out")]
    Timeout { uri: String },

    #[error("upstream request to {uri} failed: {source}")]
    Upstream {
        uri: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("failed to read upstream response from {uri}: {source}")]
    UpstreamBody {
        uri: String,
        #[source]
        source: hyper::Error,
    },

    #[error("too many redirects starting at {uri}")]
    TooManyRedirects { uri: String },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("method {0} is not forwarded")]
    MethodNotAllowed(hyper::Method),
}

impl ProxyError {
    /// Status code reported back to the inbound caller
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidUri { .. } | ProxyError::Body(_) => StatusCode::BAD_REQUEST,
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream { .. }
            | ProxyError::UpstreamBody { .. }
            | ProxyError::TooManyRedirects { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}
