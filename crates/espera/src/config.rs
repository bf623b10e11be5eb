//! Wait configuration
//!
//! Session-wide defaults for implicit and explicit waits. Settings come from
//! code, a YAML file, or environment overrides:
//!
//! ```yaml
//! default_timeout_secs: 15
//! poll_interval_ms: 200
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::driver::READY_STATE_SCRIPT;
use crate::result::{EsperaError, EsperaResult};
use crate::wait::{Poller, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_SECS};

/// Environment variable overriding the default timeout (seconds)
pub const ENV_TIMEOUT_SECS: &str = "ESPERA_TIMEOUT_SECS";

/// Environment variable overriding the poll interval (milliseconds)
pub const ENV_POLL_INTERVAL_MS: &str = "ESPERA_POLL_INTERVAL_MS";

/// Session-wide wait settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    /// Timeout applied when a call supplies none
    pub default_timeout_secs: u64,
    /// Sleep between predicate evaluations
    pub poll_interval_ms: u64,
    /// Script polled by the page-load wait
    pub ready_state_script: String,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            ready_state_script: READY_STATE_SCRIPT.to_string(),
        }
    }
}

impl WaitSettings {
    /// Create settings with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timeout in seconds
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    /// Set the poll interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Default timeout as a Duration
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Poll interval as a Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poller for an arbitrary timeout at this interval
    pub fn poller(&self, timeout: Duration) -> EsperaResult<Poller> {
        Poller::new(timeout, self.poll_interval())
    }

    /// Reject settings that would make every wait fail or spin
    pub fn validate(&self) -> EsperaResult<()> {
        if self.default_timeout_secs == 0 {
            return Err(EsperaError::configuration(
                "default_timeout_secs must be positive",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(EsperaError::configuration("poll_interval_ms must be positive"));
        }
        if self.ready_state_script.trim().is_empty() {
            return Err(EsperaError::configuration("ready_state_script is empty"));
        }
        Ok(())
    }

    /// Parse settings from YAML; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> EsperaResult<Self> {
        let settings: Self = serde_yaml_ng::from_str(yaml).map_err(|e| EsperaError::Yaml {
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> EsperaResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Apply `ESPERA_TIMEOUT_SECS` / `ESPERA_POLL_INTERVAL_MS` if set
    pub fn with_env_overrides(self) -> EsperaResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> EsperaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.default_timeout_secs = parse_number(ENV_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_number(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_number(key: &str, raw: &str) -> EsperaResult<u64> {
    raw.trim()
        .parse()
        .map_err(|_| EsperaError::configuration(format!("{key} must be an integer, got {raw:?}")))
}
