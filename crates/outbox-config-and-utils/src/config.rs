//! Configuration management for the outbox.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default remote collection service URL.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_LOG_LEVEL: &str = "FIELD_OUTBOX_LOG_LEVEL";
const ENV_ENDPOINT: &str = "FIELD_OUTBOX_ENDPOINT";
const ENV_MAX_IN_FLIGHT: &str = "FIELD_OUTBOX_MAX_IN_FLIGHT";

/// Main outbox configuration.
///
/// Every field has a default, so a partial `config.json` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Base URL of the remote collection service.
    pub endpoint: String,
    /// Maximum number of submissions in flight at once.
    pub max_in_flight: usize,
    /// Attempts before a transiently failing submission is marked failed.
    pub max_attempts: u32,
    /// First retry delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound on the exponential part of the retry delay.
    pub backoff_max_ms: u64,
    /// Upper bound of the random offset added to every retry delay.
    pub jitter_max_ms: u64,
    /// Timeout for a single send attempt.
    pub send_timeout_secs: u64,
    /// Fallback dispatch interval when nothing else wakes the dispatcher.
    pub poll_interval_secs: u64,
    /// Age after which terminal submissions may be purged.
    pub retention_days: u32,
    /// Interval between connectivity probes.
    pub probe_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_in_flight: 3,
            max_attempts: 10,
            backoff_base_ms: 2_000,
            backoff_max_ms: 300_000,
            jitter_max_ms: 1_000,
            send_timeout_secs: 30,
            poll_interval_secs: 30,
            retention_days: 7,
            probe_interval_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(level) = non_empty(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(raw) = non_empty(ENV_MAX_IN_FLIGHT) {
            match raw.trim().parse::<usize>() {
                Ok(value) => self.max_in_flight = value,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid {ENV_MAX_IN_FLIGHT}"),
            }
        }
    }

    /// Check that the configuration can drive a dispatcher.
    pub fn validate(&self) -> CoreResult<()> {
        if crate::parse_level(&self.log_level).is_none() {
            return Err(CoreError::Config(format!(
                "unknown log level: {}",
                self.log_level
            )));
        }
        if self.max_in_flight == 0 {
            return Err(CoreError::Config("max_in_flight must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(CoreError::Config("max_attempts must be at least 1".into()));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(CoreError::Config(
                "backoff_max_ms must not be smaller than backoff_base_ms".into(),
            ));
        }
        for (name, secs) in [
            ("send_timeout_secs", self.send_timeout_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("probe_interval_secs", self.probe_interval_secs),
        ] {
            if secs == 0 {
                return Err(CoreError::Config(format!("{name} must be at least 1")));
            }
        }
        self.endpoint_url()?;
        Ok(())
    }

    /// Get the endpoint as a parsed URL.
    pub fn endpoint_url(&self) -> CoreResult<Url> {
        Url::parse(&self.endpoint).map_err(CoreError::from)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }
}
