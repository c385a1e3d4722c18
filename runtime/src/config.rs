//! Configuration management for the runtime.

use std::env;
use std::time::Duration;

use stepsync_engine::{ReconcilePolicy, DEFAULT_THRESHOLD};

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Counts at or below this are not shown to the user
    pub threshold: u64,
    /// Upper bound on a single sensor count query
    pub query_timeout: Duration,
    /// Minimum spacing between two `BecameActive` events
    pub debounce: Duration,
    /// Events per minute reported by the harness's synthetic sensor
    pub sensor_rate: u64,
    /// Identity logged in when the harness starts
    pub identity: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            query_timeout: Duration::from_secs(10),
            debounce: Duration::from_millis(500),
            sensor_rate: 100,
            identity: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let threshold = parse_u64(&lookup, "STEPSYNC_THRESHOLD")?.unwrap_or(defaults.threshold);

        let query_timeout = parse_u64(&lookup, "STEPSYNC_QUERY_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.query_timeout);
        if query_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "STEPSYNC_QUERY_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }

        let debounce = parse_u64(&lookup, "STEPSYNC_DEBOUNCE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.debounce);

        let sensor_rate =
            parse_u64(&lookup, "STEPSYNC_SENSOR_RATE")?.unwrap_or(defaults.sensor_rate);

        let identity = lookup("STEPSYNC_IDENTITY").filter(|id| !id.trim().is_empty());

        Ok(Self {
            threshold,
            query_timeout,
            debounce,
            sensor_rate,
            identity,
        })
    }

    pub fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy::new(self.threshold)
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {key} value: {value:?}")]
    Invalid { key: &'static str, value: String },
}
