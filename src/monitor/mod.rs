//! The watch supervisor: authoritative owner of every live target.
//!
//! Each target runs as one spawned task driven by a timer; the supervisor
//! starts, stops, auto-stops, and restores them, and guarantees at most one
//! in-flight cycle per target (a tick that would overlap is dropped, not
//! queued).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::activity::{ActivityLog, EntryDraft, LogCategory, LogLevel};
use crate::content::url_norm;
use crate::dispatch::{WebhookDispatcher, WEBHOOK_PLACEHOLDER};
use crate::error::WatchError;
use crate::page_agent::{PageAgent, PageAgentError};
use crate::settings::EngineSettings;
use crate::store::{ConfigStore, GlobalConfig};

pub mod cycle;
pub mod failure;
pub mod target;

use cycle::{run_cycle, CycleEnv, CycleOutcome};
use failure::FailureTracker;
use target::{TargetConfig, TargetId, TargetRecord, TargetStatus};

struct RunningTarget {
    config: TargetConfig,
    cancel: watch::Sender<bool>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

pub(crate) struct SupervisorInner {
    targets: RwLock<HashMap<TargetId, RunningTarget>>,
    agent: Arc<dyn PageAgent>,
    store: Arc<dyn ConfigStore>,
    dispatcher: Arc<WebhookDispatcher>,
    log: Arc<ActivityLog>,
    failures: Arc<FailureTracker>,
    settings: EngineSettings,
}

#[derive(Clone)]
pub struct WatchSupervisor {
    inner: Arc<SupervisorInner>,
}

impl WatchSupervisor {
    pub(crate) fn new(
        agent: Arc<dyn PageAgent>,
        store: Arc<dyn ConfigStore>,
        dispatcher: Arc<WebhookDispatcher>,
        log: Arc<ActivityLog>,
        failures: Arc<FailureTracker>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                targets: RwLock::new(HashMap::new()),
                agent,
                store,
                dispatcher,
                log,
                failures,
                settings,
            }),
        }
    }

    /// Validates and persists the config, makes sure the page agent can
    /// serve the page, and installs the periodic schedule. The first cycle
    /// runs immediately and is not billed against the schedule; if the
    /// agent is unreachable the first cycle is skipped but the schedule
    /// still starts.
    pub async fn start_target(&self, config: TargetConfig) -> Result<TargetId, WatchError> {
        config.validate(self.inner.settings.min_interval_ms)?;

        // One watcher per page: a second start on the same page replaces
        // the first.
        let existing = {
            let targets = self.inner.targets.read().unwrap();
            targets
                .iter()
                .find(|(_, t)| t.config.page_ref == config.page_ref)
                .map(|(id, _)| id.clone())
        };
        if let Some(id) = existing {
            debug!(target = %id, page = %config.page_ref, "replacing running target on same page");
            if let Err(e) = self.stop_target(&id).await {
                debug!(target = %id, error = %e, "replaced target was already gone");
            }
        }

        let run_first_cycle = match self.inner.agent.ensure_ready(&config.page_ref).await {
            Ok(()) => true,
            Err(e @ PageAgentError::PageGone) => return Err(e.into()),
            Err(e @ PageAgentError::UnsupportedPage) => return Err(e.into()),
            Err(e) => {
                self.inner
                    .log
                    .append(
                        EntryDraft::new(
                            LogLevel::Warning,
                            LogCategory::PageAgent,
                            format!("page agent not ready, first cycle skipped: {e}"),
                        )
                        .url(config.initial_url.clone())
                        .detail("code", e.code()),
                    )
                    .await;
                false
            }
        };

        let record = TargetRecord::new(config);
        let id = record.id.clone();
        cycle::persist_record(&self.inner.store, &self.inner.log, &record).await;

        self.spawn(record.clone(), run_first_cycle)?;
        info!(target = %id, url = %record.config.initial_url, interval_ms = record.config.interval_ms, "target started");
        self.inner
            .log
            .append(
                EntryDraft::new(LogLevel::Info, LogCategory::Monitoring, "monitoring started")
                    .target(&id)
                    .url(record.config.initial_url.clone())
                    .detail("event", "started")
                    .detail("intervalMs", record.config.interval_ms),
            )
            .await;
        Ok(id)
    }

    /// Stops a target: removes it from the live set, signals any in-flight
    /// cycle, disables the persisted record, and clears the failure
    /// counter. Stopping an unknown target is an error.
    pub async fn stop_target(&self, id: &TargetId) -> Result<(), WatchError> {
        let removed = {
            let mut targets = self.inner.targets.write().unwrap();
            targets.remove(id)
        };
        let Some(running) = removed else {
            return Err(WatchError::TargetNotFound(id.clone()));
        };
        let _ = running.cancel.send(true);
        self.inner.failures.forget(id);
        disable_record(&self.inner, id).await;
        info!(target = %id, "target stopped");
        self.inner
            .log
            .append(
                EntryDraft::new(LogLevel::Info, LogCategory::Monitoring, "monitoring stopped")
                    .target(id)
                    .url(running.config.initial_url.clone())
                    .detail("event", "stopped"),
            )
            .await;
        Ok(())
    }

    pub async fn status(&self, id: &TargetId) -> Result<TargetStatus, WatchError> {
        let live = {
            let targets = self.inner.targets.read().unwrap();
            targets.get(id).map(|t| t.config.clone())
        };
        if let Some(config) = live {
            return Ok(TargetStatus {
                is_running: true,
                config,
            });
        }
        match self.inner.store.load_target(id).await {
            Ok(Some(record)) => Ok(TargetStatus {
                is_running: false,
                config: record.config,
            }),
            Ok(None) => Err(WatchError::TargetNotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of all live targets.
    pub fn status_all(&self) -> Vec<TargetId> {
        let targets = self.inner.targets.read().unwrap();
        let mut ids: Vec<TargetId> = targets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn live_config(&self, id: &TargetId) -> Option<TargetConfig> {
        let targets = self.inner.targets.read().unwrap();
        targets.get(id).map(|t| t.config.clone())
    }

    /// Called once at process start: loads every enabled config, matches it
    /// to a currently known page by normalized URL, re-binds the page ref
    /// when it changed, and starts the target under its original id.
    /// Configs with no matching page stay persisted for a later restore.
    pub async fn restore_from_store(&self) {
        let records = match self.inner.store.load_targets().await {
            Ok(records) => records,
            Err(e) => {
                // A read failure reads as no data.
                warn!(error = %e, "could not load persisted targets");
                return;
            }
        };
        if records.is_empty() {
            return;
        }
        let pages = self.inner.agent.known_pages().await;

        for mut record in records.into_iter().filter(|r| r.enabled) {
            let Some(wanted) = url_norm::normalize_str(&record.config.initial_url) else {
                warn!(target = %record.id, url = %record.config.initial_url, "persisted target has unusable URL");
                continue;
            };
            let matched = pages
                .iter()
                .find(|(_, url)| url_norm::normalize(url) == wanted);
            let Some((page_ref, _)) = matched else {
                debug!(target = %record.id, "no open page matches persisted target, leaving for next restore");
                continue;
            };

            if *page_ref != record.config.page_ref {
                record.config.page_ref = page_ref.clone();
                cycle::persist_record(&self.inner.store, &self.inner.log, &record).await;
            }
            if let Err(e) = self.inner.agent.ensure_ready(&record.config.page_ref).await {
                debug!(target = %record.id, error = %e, "page agent not ready during restore");
            }

            let id = record.id.clone();
            let url = record.config.initial_url.clone();
            if let Err(e) = self.spawn(record, true) {
                warn!(target = %id, error = %e, "could not restore target");
                continue;
            }
            info!(target = %id, url = %url, "target restored");
            self.inner
                .log
                .append(
                    EntryDraft::new(
                        LogLevel::Info,
                        LogCategory::Monitoring,
                        "monitoring restored after restart",
                    )
                    .target(&id)
                    .url(url)
                    .detail("event", "restored"),
                )
                .await;
        }
    }

    /// Stops every live target. There is no global cancellation token;
    /// shutdown is exactly a stop of each target.
    pub async fn shutdown(&self) {
        for id in self.status_all() {
            if let Err(e) = self.stop_target(&id).await {
                debug!(target = %id, error = %e, "target already gone during shutdown");
            }
        }
    }

    pub async fn global_config(&self) -> Result<GlobalConfig, WatchError> {
        Ok(self.inner.store.load_global().await?.unwrap_or_default())
    }

    /// All config writes flow through the supervisor. The webhook URL is
    /// validated unless it is empty or the setup placeholder, both of which
    /// persist as configured-but-unset.
    pub async fn set_global_config(&self, global: GlobalConfig) -> Result<(), WatchError> {
        if let Some(raw) = global.webhook_url.as_deref() {
            let raw = raw.trim();
            if !raw.is_empty() && raw != WEBHOOK_PLACEHOLDER {
                match url::Url::parse(raw) {
                    Ok(url) if url_norm::is_http(&url) => {}
                    _ => return Err(WatchError::InvalidWebhookUrl(raw.to_owned())),
                }
            }
        }
        self.inner.store.save_global(&global).await?;
        Ok(())
    }

    pub(crate) fn dispatcher(&self) -> Arc<WebhookDispatcher> {
        Arc::clone(&self.inner.dispatcher)
    }

    fn cycle_env(&self) -> CycleEnv {
        CycleEnv {
            agent: Arc::clone(&self.inner.agent),
            dispatcher: Arc::clone(&self.inner.dispatcher),
            log: Arc::clone(&self.inner.log),
            store: Arc::clone(&self.inner.store),
            timing: self.inner.settings.timing.clone(),
        }
    }

    fn spawn(&self, record: TargetRecord, run_first_cycle: bool) -> Result<(), WatchError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let env = self.cycle_env();
        let inner = Arc::clone(&self.inner);

        let mut targets = self.inner.targets.write().unwrap();
        if targets.contains_key(&record.id) {
            return Err(WatchError::TargetAlreadyRunning(
                record.config.page_ref.clone(),
            ));
        }
        let config = record.config.clone();
        let id = record.id.clone();
        let handle = tokio::spawn(run_target_loop(inner, env, record, cancel_rx, run_first_cycle));
        targets.insert(
            id,
            RunningTarget {
                config,
                cancel: cancel_tx,
                handle,
            },
        );
        Ok(())
    }
}

/// The per-target task: a timer loop around [`run_cycle`]. The first tick
/// fires immediately (the start-time cycle); later ticks fire every
/// interval, and ticks that would overlap a running cycle are skipped.
async fn run_target_loop(
    inner: Arc<SupervisorInner>,
    env: CycleEnv,
    mut record: TargetRecord,
    mut cancel: watch::Receiver<bool>,
    run_first_cycle: bool,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
        record.config.interval_ms.max(1),
    ));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut first = true;

    loop {
        let mut cycle_cancel = cancel.clone();
        tokio::select! {
            biased;
            _ = async {
                if *cancel.borrow() {
                    return;
                }
                loop {
                    if cancel.changed().await.is_err() {
                        return;
                    }
                    if *cancel.borrow() {
                        return;
                    }
                }
            } => {
                break;
            }
            _ = ticker.tick() => {
                if first {
                    first = false;
                    if !run_first_cycle {
                        continue;
                    }
                }
                match run_cycle(&env, &mut record, &mut cycle_cancel).await {
                    CycleOutcome::Success => {
                        inner.failures.record_success(&record.id);
                    }
                    CycleOutcome::Failure => {
                        let count = inner.failures.record_failure(&record.id);
                        if count >= inner.failures.threshold() {
                            auto_stop(&inner, &record, count).await;
                            break;
                        }
                    }
                    CycleOutcome::Cancelled => {
                        env.log
                            .append(
                                EntryDraft::new(
                                    LogLevel::Info,
                                    LogCategory::Monitoring,
                                    "cycle cancelled before completion",
                                )
                                .target(&record.id)
                                .detail("event", "cycle_cancelled"),
                            )
                            .await;
                        break;
                    }
                    CycleOutcome::NavigatedAway => {
                        stop_for_page(&inner, &record, "navigated_away").await;
                        break;
                    }
                    CycleOutcome::PageGone => {
                        stop_for_page(&inner, &record, "page_gone").await;
                        break;
                    }
                }
            }
        }
    }
    debug!(target = %record.id, "target task finished");
}

/// Failure threshold reached: the target stops itself. A concurrent
/// `stop_target` that already removed the entry wins.
async fn auto_stop(inner: &Arc<SupervisorInner>, record: &TargetRecord, count: u32) {
    let removed = {
        let mut targets = inner.targets.write().unwrap();
        targets.remove(&record.id).is_some()
    };
    if !removed {
        return;
    }
    inner.failures.forget(&record.id);
    disable_record(inner, &record.id).await;
    warn!(target = %record.id, failures = count, "target auto-stopped");
    inner
        .log
        .append(
            EntryDraft::new(
                LogLevel::Warning,
                LogCategory::Monitoring,
                format!("monitoring auto-stopped after {count} consecutive failures"),
            )
            .target(&record.id)
            .url(record.config.initial_url.clone())
            .detail("event", "auto_stopped")
            .detail("failureCount", count),
        )
        .await;
}

/// The page went away or navigated elsewhere: the target stops itself.
async fn stop_for_page(inner: &Arc<SupervisorInner>, record: &TargetRecord, event: &str) {
    let removed = {
        let mut targets = inner.targets.write().unwrap();
        targets.remove(&record.id).is_some()
    };
    if !removed {
        return;
    }
    inner.failures.forget(&record.id);
    disable_record(inner, &record.id).await;
    let message = match event {
        "navigated_away" => "page navigated away, monitoring stopped",
        _ => "page no longer exists, monitoring stopped",
    };
    warn!(target = %record.id, event, "target stopped by page state");
    inner
        .log
        .append(
            EntryDraft::new(LogLevel::Warning, LogCategory::Monitoring, message)
                .target(&record.id)
                .url(record.config.initial_url.clone())
                .detail("event", event),
        )
        .await;
}

/// Marks the persisted record disabled so a restart will not resurrect a
/// stopped target. Best-effort, same retry discipline as any other write.
async fn disable_record(inner: &Arc<SupervisorInner>, id: &TargetId) {
    let record = match inner.store.load_target(id).await {
        Ok(Some(mut record)) => {
            record.enabled = false;
            record
        }
        Ok(None) => return,
        Err(e) => {
            warn!(target = %id, error = %e, "could not load record to disable");
            return;
        }
    };
    cycle::persist_record(&inner.store, &inner.log, &record).await;
}
