//! Payload normalization and delivery transports for Fanos.
//!
//! - [`Payload`]: tagged payload kinds, [`normalize_payload`], [`payload_size`]
//! - [`BeaconSender`] / [`ReliableSender`]: the two transmission primitives
//! - [`TransportAdapter`]: beacon first, chunking for oversized payloads,
//!   optional reliable fallback
//! - [`HttpBeaconSender`] / [`ReqwestSender`]: reqwest-backed implementations

mod adapter;
mod beacon;
mod error;
mod http;
mod payload;
mod request;
mod sender;

pub use adapter::{TransportAdapter, CHUNK_MARGIN};
pub use beacon::{HttpBeaconSender, DEFAULT_BEACON_CAPACITY, MAX_BEACON_BYTES};
pub use error::{TransportError, TransportResult};
pub use http::{ReqwestSender, DEFAULT_TIMEOUT};
pub use payload::{
    chunk_text, content_type, normalize_payload, payload_size, payload_text, Blob, FormData,
    FormValue, Headers, Payload, UrlEncoded,
};
pub use request::{merge_headers, Request, SendOptions};
pub use sender::{BeaconSender, HttpRequest, HttpResponse, ReliableSender};
