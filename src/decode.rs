//! Upstream response decoding
//!
//! Handles `content-encoding` (gzip, then br, otherwise identity) and maps the
//! upstream `content-type` onto the media type written back to the caller.

use crate::error::DecodeError;
use brotli::Decompressor;
use bytes::Bytes;
use flate2::read::GzDecoder;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use hyper::StatusCode;
use std::fmt;
use std::io::Read;
use tracing::warn;

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Content encodings the proxy acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Brotli,
    Identity,
}

impl ContentEncoding {
    /// Pick the encoding to undo. gzip wins over br when both are listed;
    /// anything else is passed through untouched.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let listed = |token: &str| {
            headers
                .get_all(CONTENT_ENCODING)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .any(|coding| coding.trim().eq_ignore_ascii_case(token))
        };

        if listed("gzip") {
            ContentEncoding::Gzip
        } else if listed("br") {
            ContentEncoding::Brotli
        } else {
            ContentEncoding::Identity
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Brotli => "br",
            ContentEncoding::Identity => "identity",
        };
        f.write_str(name)
    }
}

/// Media type of the relayed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    /// No `content-type` upstream
    Any,
    JavaScript,
    Css,
    Html,
    /// Any other value, passed through as-is
    Other(String),
}

impl MediaType {
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        let Some(value) = value else {
            return MediaType::Any;
        };
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();

        let known = match value.as_str() {
            "application/javascript; charset=UTF-8" => Some(MediaType::JavaScript),
            "text/css; charset=UTF-8" => Some(MediaType::Css),
            "text/html; charset=UTF-8" => Some(MediaType::Html),
            _ => None,
        };
        known.unwrap_or(MediaType::Other(value))
    }

    /// Value for the `Content-Type` header, `None` for the wildcard
    pub fn header_value(&self) -> Option<&str> {
        match self {
            MediaType::Any => None,
            MediaType::JavaScript => Some("application/javascript; charset=utf-8"),
            MediaType::Css => Some("text/css; charset=utf-8"),
            MediaType::Html => Some("text/html; charset=utf-8"),
            MediaType::Other(value) => Some(value),
        }
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
    Empty,
}

impl Payload {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Text(text) => Bytes::from(text),
            Payload::Binary(bytes) => bytes,
            Payload::Empty => Bytes::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(text) => text.is_empty(),
            Payload::Binary(bytes) => bytes.is_empty(),
            Payload::Empty => true,
        }
    }
}

/// What the inbound layer writes back to the caller
#[derive(Debug, Clone)]
pub struct ProxyResult {
    pub status: StatusCode,
    pub media_type: MediaType,
    pub body: Payload,
}

/// Decompress `body` into UTF-8 text
pub fn decode_body(encoding: ContentEncoding, body: &[u8]) -> Result<String, DecodeError> {
    let mut decoded = Vec::new();
    let result = match encoding {
        ContentEncoding::Gzip => GzDecoder::new(body).read_to_end(&mut decoded),
        ContentEncoding::Brotli => {
            Decompressor::new(body, BROTLI_BUFFER_SIZE).read_to_end(&mut decoded)
        }
        ContentEncoding::Identity => {
            decoded.extend_from_slice(body);
            Ok(body.len())
        }
    };

    result.map_err(|source| DecodeError { encoding, source })?;
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

/// Turn an upstream response into a `ProxyResult`.
///
/// A body that fails to decode is logged and replaced by an empty payload.
pub fn decode(status: StatusCode, headers: &HeaderMap, body: Bytes) -> ProxyResult {
    let media_type = MediaType::from_header(headers.get(CONTENT_TYPE));

    let body = match ContentEncoding::from_headers(headers) {
        ContentEncoding::Identity => Payload::Binary(body),
        _ if body.is_empty() => Payload::Empty,
        encoding => match decode_body(encoding, &body) {
            Ok(text) => Payload::Text(text),
            Err(e) => {
                warn!("{}", e);
                Payload::Empty
            }
        },
    };

    ProxyResult {
        status,
        media_type,
        body,
    }
}
