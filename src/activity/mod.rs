//! The activity log: a bounded in-memory ring buffer of operational events,
//! queryable by target, level, and category, with a best-effort persisted
//! tail that survives process restarts.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::ConfigStore;

pub mod models;

pub use models::{
    mask_webhook_url, EntryDraft, LogCategory, LogCounts, LogEntry, LogFilter, LogLevel,
};

/// How many of the most recent entries are persisted after each append.
pub const SNAPSHOT_LEN: usize = 50;

/// Default in-memory capacity.
pub const DEFAULT_CAPACITY: usize = 100;

struct LogBuffer {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

pub struct ActivityLog {
    buffer: Mutex<LogBuffer>,
    store: Arc<dyn ConfigStore>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn ConfigStore>, capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(LogBuffer {
                entries: VecDeque::with_capacity(capacity),
                next_id: 1,
            }),
            store,
            capacity,
        }
    }

    /// Re-appends the persisted snapshot, oldest first, keeping original
    /// timestamps and content but assigning fresh ids for this run.
    pub async fn restore(&self) {
        let snapshot = match self.store.load_log_snapshot().await {
            Ok(entries) => entries,
            Err(e) => {
                // Reads that fail are treated as no data.
                eprintln!("pagewatch: could not load activity log snapshot: {e}");
                return;
            }
        };
        if snapshot.is_empty() {
            return;
        }
        let mut buf = self.buffer.lock().await;
        for mut entry in snapshot {
            entry.id = buf.next_id;
            buf.next_id += 1;
            if buf.entries.len() >= self.capacity {
                buf.entries.pop_front();
            }
            buf.entries.push_back(entry);
        }
        debug!(entries = buf.entries.len(), "activity log restored");
    }

    /// Appends one entry: assigns id and timestamp, masks and bounds the
    /// details, evicts the oldest row when full, then persists the most
    /// recent [`SNAPSHOT_LEN`] entries. Persistence is best-effort; a store
    /// failure is reported on stderr, never recursed into the log.
    pub async fn append(&self, draft: EntryDraft) -> LogEntry {
        let mut details = draft.details;
        models::sanitize_details(&mut details);

        let mut buf = self.buffer.lock().await;
        let entry = LogEntry {
            id: buf.next_id,
            timestamp: Utc::now().timestamp_millis(),
            level: draft.level,
            category: draft.category,
            message: draft.message,
            target_id: draft.target_id,
            url: draft.url,
            details,
        };
        buf.next_id += 1;
        if buf.entries.len() >= self.capacity {
            buf.entries.pop_front();
        }
        buf.entries.push_back(entry.clone());

        let start = buf.entries.len().saturating_sub(SNAPSHOT_LEN);
        let snapshot: Vec<LogEntry> = buf.entries.iter().skip(start).cloned().collect();
        // The buffer lock is held across the store write so snapshots reach
        // the store in append order.
        if let Err(e) = self.store.save_log_snapshot(&snapshot).await {
            eprintln!("pagewatch: could not persist activity log snapshot: {e}");
        }
        entry
    }

    /// All entries, oldest first.
    pub async fn get_all(&self) -> Vec<LogEntry> {
        self.buffer.lock().await.entries.iter().cloned().collect()
    }

    /// The last `n` entries, still oldest first.
    pub async fn get_recent(&self, n: usize) -> Vec<LogEntry> {
        let buf = self.buffer.lock().await;
        let start = buf.entries.len().saturating_sub(n);
        buf.entries.iter().skip(start).cloned().collect()
    }

    /// Entries matching every supplied predicate, oldest first. `limit`
    /// keeps the most recent matches.
    pub async fn query(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let buf = self.buffer.lock().await;
        let matched: Vec<LogEntry> = buf
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        match filter.limit {
            Some(limit) => {
                let start = matched.len().saturating_sub(limit);
                matched[start..].to_vec()
            }
            None => matched,
        }
    }

    pub async fn counts(&self) -> LogCounts {
        let buf = self.buffer.lock().await;
        let mut counts = LogCounts::default();
        for entry in &buf.entries {
            match entry.level {
                LogLevel::Info => counts.info += 1,
                LogLevel::Success => counts.success += 1,
                LogLevel::Warning => counts.warning += 1,
                LogLevel::Error => counts.error += 1,
            }
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.buffer.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Empties the buffer and removes the persisted snapshot. Failure
    /// counters are reset by the engine alongside this call.
    pub async fn clear(&self) {
        let mut buf = self.buffer.lock().await;
        buf.entries.clear();
        if let Err(e) = self.store.clear_log_snapshot().await {
            eprintln!("pagewatch: could not clear activity log snapshot: {e}");
        }
    }
}
