//! The Config Store façade: everything the engine persists goes through the
//! [`ConfigStore`] trait under a stable schema: global settings, target
//! records, opaque UI profiles, and the activity log snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::activity::models::LogEntry;
use crate::monitor::target::{TargetId, TargetRecord};

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Monitoring defaults applied when a start request leaves fields unset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringDefaults {
    pub refresh_interval_ms: u64,
    pub change_detection: bool,
}

impl Default for MonitoringDefaults {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 60_000,
            change_detection: true,
        }
    }
}

/// Persisted global configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub defaults: Option<MonitoringDefaults>,
}

/// The whole persisted document. Implementations read-modify-write it as a
/// unit; readers see either the pre- or post-write snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StoreDocument {
    pub global: Option<GlobalConfig>,
    pub targets: BTreeMap<String, TargetRecord>,
    pub profiles: BTreeMap<String, Value>,
    pub activity_log_snapshot: Vec<LogEntry>,
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_global(&self) -> Result<Option<GlobalConfig>, StoreError>;
    async fn save_global(&self, global: &GlobalConfig) -> Result<(), StoreError>;

    async fn load_targets(&self) -> Result<Vec<TargetRecord>, StoreError>;
    async fn load_target(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError>;
    async fn save_target(&self, record: &TargetRecord) -> Result<(), StoreError>;
    async fn delete_target(&self, id: &TargetId) -> Result<(), StoreError>;

    async fn load_log_snapshot(&self) -> Result<Vec<LogEntry>, StoreError>;
    async fn save_log_snapshot(&self, entries: &[LogEntry]) -> Result<(), StoreError>;
    async fn clear_log_snapshot(&self) -> Result<(), StoreError>;

    /// Profiles are UI presets; the engine stores and returns them verbatim.
    async fn list_profiles(&self) -> Result<BTreeMap<String, Value>, StoreError>;
    async fn save_profile(&self, name: &str, body: &Value) -> Result<(), StoreError>;
    async fn delete_profile(&self, name: &str) -> Result<(), StoreError>;
}
