//! Per-capability adapter configuration.

use crate::error::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one HTTP capability adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API base URL.
    pub base_url: String,
    /// API key; usually injected from an environment variable.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Provider-side model tag for this capability.
    pub model: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
    /// Sustained request rate, per minute.
    #[serde(default = "default_rate_per_minute")]
    pub rate_per_minute: u32,
    /// Maximum in-flight requests.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_timeout_s() -> u64 {
    120
}

fn default_rate_per_minute() -> u32 {
    60
}

fn default_max_concurrency() -> usize {
    4
}

impl ProviderConfig {
    /// Build a config, reading the API key from the given environment
    /// variable.
    pub fn from_env(
        key_var: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = std::env::var(key_var)
            .map_err(|_| ProviderError::Config(format!("{key_var} not set")))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            timeout_s: default_timeout_s(),
            rate_per_minute: default_rate_per_minute(),
            max_concurrency: default_max_concurrency(),
        })
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }

    /// Set the per-request timeout.
    pub fn with_timeout_s(mut self, timeout_s: u64) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    /// Set the sustained rate limit.
    pub fn with_rate_per_minute(mut self, rate: u32) -> Self {
        self.rate_per_minute = rate;
        self
    }

    /// Set the concurrency cap.
    pub fn with_max_concurrency(mut self, cap: usize) -> Self {
        self.max_concurrency = cap;
        self
    }
}
