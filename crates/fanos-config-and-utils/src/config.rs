//! Delivery configuration.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default endpoint baked in at compile time via the FANOS_DEFAULT_URL env var.
pub const DEFAULT_URL: Option<&str> = option_env!("FANOS_DEFAULT_URL");

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Content type attached to serialized structured payloads.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Storage key the queue is persisted under.
pub const DEFAULT_STORE_KEY: &str = "__FANOS__";

pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64_000;
pub const DEFAULT_MAX_ATTEMPTS_PER_REQUEST: u32 = 3;
pub const DEFAULT_MAX_RETRY_CYCLES: u32 = 10;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 300_000;

/// Live delivery configuration.
///
/// Field names serialize to the camelCase option names (`storeKey`,
/// `retryInterval`, ...). Missing fields take their defaults, so a partial
/// config file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FanosConfig {
    /// Default destination when a request does not name one.
    pub url: Option<String>,
    /// Default headers, merged under per-call headers.
    pub headers: BTreeMap<String, String>,
    /// Storage key for the serialized queue.
    pub store_key: String,
    /// Flush on page-hide / unload / visibility-change notifications.
    pub auto_flush: bool,
    /// Keep (and persist) failed requests for retry.
    pub store_failed: bool,
    /// Emit internal diagnostic events.
    pub debug: bool,
    /// Base delay before the first retry cycle.
    #[serde(rename = "retryInterval")]
    pub retry_interval_ms: u64,
    /// Byte threshold above which a payload is split.
    pub max_payload_size: usize,
    /// Attempts allowed before a queued request is dropped.
    pub max_attempts_per_request: u32,
    /// Scheduled retry passes before the scheduler gives up.
    pub max_retry_cycles: u32,
    /// Upper bound on the exponentially growing retry delay.
    #[serde(rename = "maxRetryDelay")]
    pub max_retry_delay_ms: u64,
    /// Try the reliable request/response transport after a failed beacon.
    pub fallback_to_fetch: bool,
}

impl Default for FanosConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string());

        Self {
            url: DEFAULT_URL.map(|s| s.to_string()),
            headers,
            store_key: DEFAULT_STORE_KEY.to_string(),
            auto_flush: true,
            store_failed: true,
            debug: false,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_attempts_per_request: DEFAULT_MAX_ATTEMPTS_PER_REQUEST,
            max_retry_cycles: DEFAULT_MAX_RETRY_CYCLES,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            fallback_to_fetch: false,
        }
    }
}

impl FanosConfig {
    /// Defaults, then environment overrides.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load `config.json` from the base directory when present, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FanosConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `config.json` under the base directory.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// FANOS_URL replaces the default endpoint, FANOS_DEBUG toggles diagnostics.
    fn load_from_env(&mut self) {
        if let Ok(url) = std::env::var("FANOS_URL") {
            let url = url.trim();
            if !url.is_empty() {
                self.url = Some(url.to_string());
            }
        }
        if let Ok(debug) = std::env::var("FANOS_DEBUG") {
            self.debug = matches!(debug.trim().to_ascii_lowercase().as_str(), "1" | "true");
        }
    }

    /// Merge a partial set of options into this configuration.
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.url {
            self.url = Some(url.clone());
        }
        if let Some(headers) = &overrides.headers {
            self.headers = headers.clone();
        }
        if let Some(store_key) = &overrides.store_key {
            self.store_key = store_key.clone();
        }
        if let Some(v) = overrides.auto_flush {
            self.auto_flush = v;
        }
        if let Some(v) = overrides.store_failed {
            self.store_failed = v;
        }
        if let Some(v) = overrides.debug {
            self.debug = v;
        }
        if let Some(v) = overrides.retry_interval_ms {
            self.retry_interval_ms = v;
        }
        if let Some(v) = overrides.max_payload_size {
            self.max_payload_size = v;
        }
        if let Some(v) = overrides.max_attempts_per_request {
            self.max_attempts_per_request = v;
        }
        if let Some(v) = overrides.max_retry_cycles {
            self.max_retry_cycles = v;
        }
        if let Some(v) = overrides.max_retry_delay_ms {
            self.max_retry_delay_ms = v;
        }
        if let Some(v) = overrides.fallback_to_fetch {
            self.fallback_to_fetch = v;
        }
    }

    /// Copy of this configuration with `overrides` applied.
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Self {
        let mut config = self.clone();
        config.apply(overrides);
        config
    }

    /// Parsed default endpoint, if one is configured.
    pub fn endpoint(&self) -> CoreResult<Option<Url>> {
        self.url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(CoreError::from)
    }

    /// Base retry delay.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Retry cycle bound; zero means "use the default".
    pub fn effective_max_retry_cycles(&self) -> u32 {
        if self.max_retry_cycles == 0 {
            DEFAULT_MAX_RETRY_CYCLES
        } else {
            self.max_retry_cycles
        }
    }

    /// Retry delay cap; zero means "use the default".
    pub fn effective_max_retry_delay(&self) -> Duration {
        if self.max_retry_delay_ms == 0 {
            Duration::from_millis(DEFAULT_MAX_RETRY_DELAY_MS)
        } else {
            Duration::from_millis(self.max_retry_delay_ms)
        }
    }
}

/// Partial configuration accepted by `configure` and by instance construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub store_key: Option<String>,
    pub auto_flush: Option<bool>,
    pub store_failed: Option<bool>,
    pub debug: Option<bool>,
    #[serde(rename = "retryInterval")]
    pub retry_interval_ms: Option<u64>,
    pub max_payload_size: Option<usize>,
    pub max_attempts_per_request: Option<u32>,
    pub max_retry_cycles: Option<u32>,
    #[serde(rename = "maxRetryDelay")]
    pub max_retry_delay_ms: Option<u64>,
    pub fallback_to_fetch: Option<bool>,
}
