//! Best-effort beacon delivery queue.
//!
//! This crate provides:
//! - Fanos: controller with `send` / `flush` / `configure` / `destroy`
//! - DeliveryQueue: failed requests awaiting retry, deduplicated by id
//! - RetryScheduler: periodic flush passes with capped exponential backoff
//! - PersistenceBridge: debounced queue snapshots to a key-value store
//! - global: optional process-wide default instance

mod error;
mod fanos;
pub mod global;
mod persistence;
mod queue;
mod scheduler;

#[cfg(test)]
mod tests;

pub use error::{OutboxError, OutboxResult};
pub use fanos::{Fanos, FanosBuilder, FlushReport};
pub use persistence::{PersistOutcome, PersistenceBridge, MAX_PERSISTED, PERSIST_DEBOUNCE};
pub use queue::DeliveryQueue;
pub use scheduler::{compute_backoff, RetryPolicy, RetryScheduler, SchedulerState};

pub use fanos_transport::{Payload, Request, SendOptions};

use fanos_config_and_utils::FanosConfig;
use parking_lot::RwLock;
use std::sync::Arc;

/// Live configuration shared by the controller and its components.
pub type SharedConfig = Arc<RwLock<FanosConfig>>;
