//! Logging initialization.
//!
//! Thin wrapper over the observability package so every Fanos binary logs
//! the same way: structured JSONL to `~/.fanos/logs/dev.jsonl`, with the
//! level taken from `RUST_LOG`, `FANOS_LOG_LEVEL`, or the provided default.

use observability::LogConfig;

#[doc(hidden)]
pub use tracing as __tracing;

/// Emit a `debug!` event only when the instance's `debug` option is on.
///
/// ```ignore
/// diag!(config.debug, request_id = %id, "Beacon accepted");
/// ```
#[macro_export]
macro_rules! diag {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            $crate::__tracing::debug!($($arg)+);
        }
    };
}

/// Initialize the logging system under the "fanos" service name.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("ready");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("fanos", level);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    let level = std::env::var("FANOS_LOG_LEVEL")
        .ok()
        .and_then(non_empty_env)
        .unwrap_or_else(|| level.to_string());

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(&level).to_string().to_lowercase(),
        also_stderr: true,
        ..Default::default()
    });
}

fn non_empty_env(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_case_insensitive() {
        assert_eq!(parse_level("Debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("WARNING"), tracing::Level::WARN);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn level_renders_as_filter_directive() {
        assert_eq!(parse_level("warn").to_string().to_lowercase(), "warn");
    }

    #[test]
    fn non_empty_env_trims() {
        assert_eq!(non_empty_env("  debug ".into()), Some("debug".to_string()));
        assert_eq!(non_empty_env("   ".into()), None);
    }
}
