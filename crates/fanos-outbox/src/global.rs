//! Process-wide default instance.
//!
//! For embedders that want `fanos_outbox::global::send(...)` style calls.
//! The instance is installed once at start-up; nothing inside this crate
//! reaches for it.

use crate::{Fanos, FlushReport, OutboxError, OutboxResult};
use fanos_config_and_utils::ConfigOverrides;
use fanos_transport::{Payload, SendOptions};
use std::sync::OnceLock;

static INSTANCE: OnceLock<Fanos> = OnceLock::new();

/// Install the default instance. Fails if one is already installed.
pub fn install(fanos: Fanos) -> OutboxResult<()> {
    INSTANCE
        .set(fanos)
        .map_err(|_| OutboxError::AlreadyInstalled)
}

/// Handle to the default instance.
pub fn instance() -> OutboxResult<Fanos> {
    INSTANCE.get().cloned().ok_or(OutboxError::NotInstalled)
}

pub fn is_installed() -> bool {
    INSTANCE.get().is_some()
}

pub async fn send(data: impl Into<Payload>, options: SendOptions) -> OutboxResult<()> {
    instance()?.send(data, options).await
}

pub fn configure(overrides: &ConfigOverrides) -> OutboxResult<Fanos> {
    Ok(instance()?.configure(overrides))
}

pub async fn flush() -> OutboxResult<FlushReport> {
    Ok(instance()?.flush().await)
}

pub fn destroy() -> OutboxResult<()> {
    instance()?.destroy();
    Ok(())
}
