//! In-memory store for tests and embedders that manage persistence
//! elsewhere.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::activity::models::LogEntry;
use crate::monitor::target::{TargetId, TargetRecord};

use super::{ConfigStore, GlobalConfig, StoreDocument, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load_global(&self) -> Result<Option<GlobalConfig>, StoreError> {
        Ok(self.doc.lock().await.global.clone())
    }

    async fn save_global(&self, global: &GlobalConfig) -> Result<(), StoreError> {
        self.doc.lock().await.global = Some(global.clone());
        Ok(())
    }

    async fn load_targets(&self) -> Result<Vec<TargetRecord>, StoreError> {
        Ok(self.doc.lock().await.targets.values().cloned().collect())
    }

    async fn load_target(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        Ok(self.doc.lock().await.targets.get(id.as_str()).cloned())
    }

    async fn save_target(&self, record: &TargetRecord) -> Result<(), StoreError> {
        self.doc
            .lock()
            .await
            .targets
            .insert(record.id.as_str().to_owned(), record.clone());
        Ok(())
    }

    async fn delete_target(&self, id: &TargetId) -> Result<(), StoreError> {
        self.doc.lock().await.targets.remove(id.as_str());
        Ok(())
    }

    async fn load_log_snapshot(&self) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.doc.lock().await.activity_log_snapshot.clone())
    }

    async fn save_log_snapshot(&self, entries: &[LogEntry]) -> Result<(), StoreError> {
        self.doc.lock().await.activity_log_snapshot = entries.to_vec();
        Ok(())
    }

    async fn clear_log_snapshot(&self) -> Result<(), StoreError> {
        self.doc.lock().await.activity_log_snapshot.clear();
        Ok(())
    }

    async fn list_profiles(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        Ok(self.doc.lock().await.profiles.clone())
    }

    async fn save_profile(&self, name: &str, body: &Value) -> Result<(), StoreError> {
        self.doc
            .lock()
            .await
            .profiles
            .insert(name.to_owned(), body.clone());
        Ok(())
    }

    async fn delete_profile(&self, name: &str) -> Result<(), StoreError> {
        self.doc.lock().await.profiles.remove(name);
        Ok(())
    }
}
