//! Target model: a declared intention to watch one page with one selector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::content::url_norm;
use crate::error::WatchError;
use crate::page_agent::{ContentMode, PageRef};

/// Opaque identity minted by the supervisor at start time. Stable for the
/// target's lifetime, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub(crate) fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

/// User-declared watch configuration, as accepted by `start_target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub page_ref: PageRef,
    pub initial_url: String,
    pub selector: String,
    pub content_mode: ContentMode,
    pub interval_ms: u64,
    pub change_detection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
}

impl TargetConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Checks the target invariants. `min_interval_ms` is the engine's
    /// configured floor (5 000 ms by default).
    pub fn validate(&self, min_interval_ms: u64) -> Result<(), WatchError> {
        if self.selector.trim().is_empty() {
            return Err(WatchError::InvalidSelector);
        }
        if self.interval_ms < min_interval_ms {
            return Err(WatchError::InvalidInterval {
                got_ms: self.interval_ms,
                min_ms: min_interval_ms,
            });
        }
        match Url::parse(&self.initial_url) {
            Ok(url) if url_norm::is_http(&url) => {}
            _ => return Err(WatchError::InvalidPageUrl(self.initial_url.clone())),
        }
        if let Some(raw) = &self.webhook_override {
            match Url::parse(raw) {
                Ok(url) if url_norm::is_http(&url) => {}
                _ => return Err(WatchError::InvalidWebhookUrl(raw.clone())),
            }
        }
        Ok(())
    }
}

/// The persisted form of a target: config plus lifecycle state. `last_hash`
/// is present iff at least one successful cycle has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub id: TargetId,
    #[serde(flatten)]
    pub config: TargetConfig,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<i64>,
}

impl TargetRecord {
    pub(crate) fn new(config: TargetConfig) -> Self {
        Self {
            id: TargetId::mint(),
            config,
            enabled: true,
            last_hash: None,
            last_check_at: None,
        }
    }
}

/// Snapshot returned by the `status` query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub is_running: bool,
    pub config: TargetConfig,
}
