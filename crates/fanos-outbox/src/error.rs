//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Immediate delivery failed. The request may still be queued for retry.
    #[error("Delivery failed for request {request_id}")]
    DeliveryFailed { request_id: String },

    /// No process-wide instance has been installed
    #[error("No default Fanos instance installed")]
    NotInstalled,

    /// A process-wide instance is already installed
    #[error("Default Fanos instance already installed")]
    AlreadyInstalled,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] fanos_storage::StorageError),

    /// Transport setup error
    #[error("Transport error: {0}")]
    Transport(#[from] fanos_transport::TransportError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid instance configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
