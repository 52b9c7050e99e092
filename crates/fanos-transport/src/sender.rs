//! Transmission primitives the adapter delivers through.

use crate::payload::{Headers, Payload};
use crate::TransportResult;
use async_trait::async_trait;

/// Fire-and-forget sender.
///
/// `try_send` answers synchronously whether the payload was accepted for
/// delivery. There is no response to inspect.
pub trait BeaconSender: Send + Sync {
    fn try_send(&self, url: &str, payload: &Payload) -> bool;
}

/// Request/response sender used as the fallback path.
#[async_trait]
pub trait ReliableSender: Send + Sync {
    async fn request(&self, url: &str, request: HttpRequest) -> TransportResult<HttpResponse>;
}

/// Outgoing request for a [`ReliableSender`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub headers: Headers,
    pub body: Payload,
    /// Ask the transport to let the request outlive its caller.
    pub keepalive: bool,
}

impl HttpRequest {
    pub fn post(headers: Headers, body: Payload) -> Self {
        Self {
            method: "POST".to_string(),
            headers,
            body,
            keepalive: true,
        }
    }
}

/// Status and body text returned by a [`ReliableSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
