//! locurlfwd - A single-port local reverse proxy
//!
//! Routes each inbound request by its first path segment:
//! - Destination table built once from `URL`, `prefix=URL` and `prefix^URL` specs
//! - Inclusive and exclusive prefix rewriting
//! - Header sanitization before forwarding
//! - gzip and Brotli response decoding

pub mod decode;
pub mod destination;
pub mod engine;
pub mod error;
pub mod proxy;
pub mod router;
pub mod translate;

pub use decode::{ContentEncoding, MediaType, Payload, ProxyResult};
pub use destination::{DestinationEntry, DestinationTable, Rewrite};
pub use engine::{build_client, ProxyEngine};
pub use error::{ConfigError, DecodeError, ProxyError};
pub use proxy::{ProxyConfig, ProxyServer};
pub use router::resolve;
pub use translate::{InboundRequest, OutboundRequest};
