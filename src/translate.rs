//! Inbound -> outbound request translation

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE,
    COOKIE, HOST, PROXY_AUTHORIZATION, UPGRADE,
};
use hyper::{Method, Request, StatusCode, Uri};
use url::Url;

/// Headers the outbound client manages itself and that are never forwarded
pub static RESTRICTED_HEADERS: [HeaderName; 4] = [CONNECTION, CONTENT_LENGTH, HOST, UPGRADE];

/// Methods the proxy forwards
pub static FORWARDED_METHODS: [Method; 7] = [
    Method::DELETE,
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::POST,
    Method::PUT,
];

/// A request as delivered by the inbound server
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Raw request path, starting with `/`
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Path plus `?query` as the caller sent it
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// A request ready to be sent upstream.
///
/// The URI is carried as an `http::Uri` so the path and query reach the
/// upstream byte for byte as the router built them.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub uri: Uri,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    /// Turn into a hyper request for the outbound client
    pub fn into_request(self) -> Request<Full<Bytes>> {
        let mut request = Request::new(Full::new(self.body.unwrap_or_default()));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.headers;
        request
    }

    /// The request to send after a redirect response, or `None` when `status`
    /// is not a followable redirect or `location` cannot be resolved.
    ///
    /// 301, 302 and 303 continue as GET (HEAD stays HEAD) without a body;
    /// 307 and 308 repeat the method and body. Credentials are dropped when
    /// the redirect leaves the original authority.
    pub fn follow_redirect(self, status: StatusCode, location: &HeaderValue) -> Option<Self> {
        let location = location.to_str().ok()?;
        let next = Url::parse(&self.uri.to_string()).ok()?.join(location).ok()?;
        let uri: Uri = next.as_str().parse().ok()?;

        let OutboundRequest {
            uri: previous,
            mut method,
            mut headers,
            mut body,
        } = self;

        match status {
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => {
                if method != Method::HEAD {
                    method = Method::GET;
                }
                body = None;
                headers.remove(CONTENT_TYPE);
            }
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => {}
            _ => return None,
        }

        if uri.authority() != previous.authority() {
            headers.remove(AUTHORIZATION);
            headers.remove(PROXY_AUTHORIZATION);
            headers.remove(COOKIE);
        }

        Some(OutboundRequest {
            uri,
            method,
            headers,
            body,
        })
    }
}

pub fn is_forwarded_method(method: &Method) -> bool {
    FORWARDED_METHODS.contains(method)
}

/// PATCH, POST and PUT carry a body upstream; nothing else does
pub fn has_payload(method: &Method) -> bool {
    matches!(*method, Method::PATCH | Method::POST | Method::PUT)
}

/// Copy `headers` without the restricted ones, keeping every repeated value.
///
/// Values are regrouped under the first occurrence of their name: interleaved
/// `a: 1`, `b: 2`, `a: 3` goes out as `a: 1`, `a: 3`, `b: 2`. Order within one
/// name is preserved.
pub fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
    let mut sanitized = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !RESTRICTED_HEADERS.contains(name) {
            sanitized.append(name.clone(), value.clone());
        }
    }
    sanitized
}

/// Build the outbound request for an already resolved upstream URI
pub fn translate(inbound: &InboundRequest, uri: Uri) -> OutboundRequest {
    let body = if has_payload(&inbound.method) {
        Some(inbound.body.clone())
    } else {
        None
    };

    OutboundRequest {
        uri,
        method: inbound.method.clone(),
        headers: sanitize_headers(&inbound.headers),
        body,
    }
}
