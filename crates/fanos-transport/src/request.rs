//! The unit of delivery work.

use crate::payload::{Headers, Payload};
use chrono::Utc;
use fanos_config_and_utils::{generate_request_id, FanosConfig};
use serde::{Deserialize, Serialize};

/// Per-call options for `send`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Destination; falls back to the configured default url.
    pub url: Option<String>,
    /// Merged over the configured default headers.
    pub headers: Headers,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A payload on its way to an endpoint, plus delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Headers,
    pub data: Payload,
    #[serde(default)]
    pub attempts: u32,
    /// Creation time, epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl Request {
    /// Build a fresh request from `data`, resolving url and headers against
    /// the instance configuration.
    pub fn new(data: Payload, options: &SendOptions, config: &FanosConfig) -> Self {
        Self {
            id: generate_request_id(),
            url: options.url.clone().or_else(|| config.url.clone()),
            headers: merge_headers(&config.headers, &options.headers),
            data,
            attempts: 0,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Overlay `overrides` on `defaults`. Header names compare case-insensitively,
/// so a per-call `content-type` replaces a default `Content-Type`.
pub fn merge_headers(defaults: &Headers, overrides: &Headers) -> Headers {
    let mut merged = defaults.clone();
    for (name, value) in overrides {
        merged.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        merged.insert(name.clone(), value.clone());
    }
    merged
}
