//! Engine tunables, layered: optional TOML file under environment
//! variables. Environment variables have the highest priority; anything
//! unset falls back to the documented default.

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::store::MonitoringDefaults;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Delays and budgets of a single watch cycle. Programmatic knobs only;
/// the defaults are the documented behavior.
#[derive(Debug, Clone)]
pub struct CycleTiming {
    /// Readiness poll cadence.
    pub ready_poll: Duration,
    /// Hard ceiling on waiting for readiness.
    pub ready_ceiling: Duration,
    /// Delay before the first extract attempt, absorbing client-side
    /// dynamic content.
    pub extract_initial_delay: Duration,
    /// Delay between extract attempts.
    pub extract_retry_delay: Duration,
    /// Total extract attempts per cycle.
    pub extract_attempts: u32,
    /// Outbound webhook POST timeout.
    pub webhook_timeout: Duration,
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self {
            ready_poll: Duration::from_millis(500),
            ready_ceiling: Duration::from_secs(10),
            extract_initial_delay: Duration::from_secs(5),
            extract_retry_delay: Duration::from_secs(3),
            extract_attempts: 10,
            webhook_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Default webhook used when neither caller nor target supplies one and
    /// the store has no global URL.
    pub default_webhook_url: Option<String>,
    /// Monitoring defaults applied to start requests with unset fields.
    pub defaults: MonitoringDefaults,
    /// Consecutive failures before a target is auto-stopped.
    pub failure_threshold: u32,
    /// Activity log ring capacity.
    pub log_capacity: usize,
    /// Smallest accepted polling interval.
    pub min_interval_ms: u64,
    pub timing: CycleTiming,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_webhook_url: None,
            defaults: MonitoringDefaults::default(),
            failure_threshold: 5,
            log_capacity: crate::activity::DEFAULT_CAPACITY,
            min_interval_ms: 5_000,
            timing: CycleTiming::default(),
        }
    }
}

// Layering scratch space; every field optional.
#[derive(Debug, Default, Deserialize)]
struct PartialSettings {
    webhook_url: Option<String>,
    default_interval_ms: Option<u64>,
    default_change_detection: Option<bool>,
    failure_threshold: Option<u32>,
    log_capacity: Option<usize>,
    min_interval_ms: Option<u64>,
}

impl EngineSettings {
    /// Loads settings from an optional TOML file, then overrides from the
    /// `PAGEWATCH_*` environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut partial: PartialSettings = match config_path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => PartialSettings::default(),
        };

        if let Ok(val) = env::var("PAGEWATCH_WEBHOOK_URL") {
            partial.webhook_url = Some(val);
        }
        if let Ok(val) = env::var("PAGEWATCH_DEFAULT_INTERVAL_MS") {
            partial.default_interval_ms = Some(parse_env("PAGEWATCH_DEFAULT_INTERVAL_MS", &val)?);
        }
        if let Ok(val) = env::var("PAGEWATCH_FAILURE_THRESHOLD") {
            partial.failure_threshold = Some(parse_env("PAGEWATCH_FAILURE_THRESHOLD", &val)?);
        }
        if let Ok(val) = env::var("PAGEWATCH_LOG_CAPACITY") {
            partial.log_capacity = Some(parse_env("PAGEWATCH_LOG_CAPACITY", &val)?);
        }

        let base = EngineSettings::default();
        let settings = EngineSettings {
            default_webhook_url: partial.webhook_url,
            defaults: MonitoringDefaults {
                refresh_interval_ms: partial
                    .default_interval_ms
                    .unwrap_or(base.defaults.refresh_interval_ms),
                change_detection: partial
                    .default_change_detection
                    .unwrap_or(base.defaults.change_detection),
            },
            failure_threshold: partial.failure_threshold.unwrap_or(base.failure_threshold),
            log_capacity: partial.log_capacity.unwrap_or(base.log_capacity),
            min_interval_ms: partial.min_interval_ms.unwrap_or(base.min_interval_ms),
            timing: CycleTiming::default(),
        };

        if settings.failure_threshold == 0 {
            return Err(SettingsError::Invalid(
                "failure_threshold must be at least 1".into(),
            ));
        }
        if settings.log_capacity == 0 {
            return Err(SettingsError::Invalid(
                "log_capacity must be at least 1".into(),
            ));
        }
        Ok(settings)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, val: &str) -> Result<T, SettingsError> {
    val.parse()
        .map_err(|_| SettingsError::Invalid(format!("{key} is not a valid value: {val:?}")))
}
