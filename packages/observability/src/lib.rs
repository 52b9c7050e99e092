//! Logging bootstrap shared by the Fanos binaries.
//!
//! Library crates only emit `tracing` events. A binary calls [`init`] or
//! [`init_with_config`] once at start-up to decide where they go:
//!
//! - with the `dev` feature (default): JSONL appended to
//!   `~/.fanos/logs/dev.jsonl`, plus a compact stderr mirror when
//!   [`LogConfig::also_stderr`] is set
//! - without it, or when the log file cannot be opened: a compact `fmt`
//!   subscriber
//!
//! `RUST_LOG` wins over [`LogConfig::default_level`].
//!
//! ```rust,ignore
//! observability::init("fanos");
//! tracing::info!(queued = 3, "Fanos initialized");
//! ```

#[cfg(feature = "dev")]
mod dev;
mod json_layer;

pub use json_layer::{JsonLayer, LogEntry};
pub use tracing::Level;

use std::path::PathBuf;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// How a process wants its logs routed.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written as `service` on every JSONL line.
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_level: String,
    /// Overrides the dev-mode log file.
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "fanos".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Install the global subscriber. Later calls keep the first subscriber.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        if dev::init_dev_subscriber(&config) {
            return;
        }
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .finish()
        .try_init();
}
