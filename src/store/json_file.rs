//! JSON-file-backed store. The whole document lives in one file; every write
//! is a read-merge-write under an exclusive lock, flushed through a
//! temporary file and an atomic rename so readers never observe a partial
//! document.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::activity::models::LogEntry;
use crate::monitor::target::{TargetId, TargetRecord};

use super::{ConfigStore, GlobalConfig, StoreDocument, StoreError};

pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty document; that is the first-run case.
    async fn read(&self) -> Result<StoreDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = body.len(), "store document written");
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreDocument),
    {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        apply(&mut doc);
        self.write(&doc).await
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load_global(&self) -> Result<Option<GlobalConfig>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.global)
    }

    async fn save_global(&self, global: &GlobalConfig) -> Result<(), StoreError> {
        let global = global.clone();
        self.update(move |doc| doc.global = Some(global)).await
    }

    async fn load_targets(&self) -> Result<Vec<TargetRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.targets.into_values().collect())
    }

    async fn load_target(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.targets.remove(id.as_str()))
    }

    async fn save_target(&self, record: &TargetRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.update(move |doc| {
            doc.targets.insert(record.id.as_str().to_owned(), record);
        })
        .await
    }

    async fn delete_target(&self, id: &TargetId) -> Result<(), StoreError> {
        let key = id.as_str().to_owned();
        self.update(move |doc| {
            doc.targets.remove(&key);
        })
        .await
    }

    async fn load_log_snapshot(&self) -> Result<Vec<LogEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.activity_log_snapshot)
    }

    async fn save_log_snapshot(&self, entries: &[LogEntry]) -> Result<(), StoreError> {
        let entries = entries.to_vec();
        self.update(move |doc| doc.activity_log_snapshot = entries)
            .await
    }

    async fn clear_log_snapshot(&self) -> Result<(), StoreError> {
        self.update(|doc| doc.activity_log_snapshot.clear()).await
    }

    async fn list_profiles(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.profiles)
    }

    async fn save_profile(&self, name: &str, body: &Value) -> Result<(), StoreError> {
        let name = name.to_owned();
        let body = body.clone();
        self.update(move |doc| {
            doc.profiles.insert(name, body);
        })
        .await
    }

    async fn delete_profile(&self, name: &str) -> Result<(), StoreError> {
        let name = name.to_owned();
        self.update(move |doc| {
            doc.profiles.remove(&name);
        })
        .await
    }
}
