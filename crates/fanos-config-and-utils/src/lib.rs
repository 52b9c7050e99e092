//! Core types, configuration, and utilities for Fanos.

mod config;
mod error;
mod ids;
mod logging;
mod paths;

pub use config::{
    ConfigOverrides, FanosConfig, DEFAULT_CONTENT_TYPE, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_ATTEMPTS_PER_REQUEST, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_RETRY_CYCLES,
    DEFAULT_MAX_RETRY_DELAY_MS, DEFAULT_RETRY_INTERVAL_MS, DEFAULT_STORE_KEY, DEFAULT_URL,
};
pub use error::{CoreError, CoreResult};
pub use ids::generate_request_id;
#[doc(hidden)]
pub use logging::__tracing;
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
