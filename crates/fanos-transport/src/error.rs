//! Transport error types.

use thiserror::Error;

/// Transport error type.
///
/// Callers of the adapter only ever see a delivered/not-delivered outcome;
/// the variants exist so failures can be logged with the right detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network-level failure (connection refused, DNS, timeout, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// HTTP client could not be constructed or the request was malformed
    #[error("Client error: {0}")]
    Client(String),

    /// Payload could not be encoded
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
