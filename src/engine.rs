//! Explicit wiring of the whole engine. Every component is constructed
//! here and handed its collaborators; nothing reaches for global state.

use std::sync::Arc;
use tracing::info;

use crate::activity::{ActivityLog, EntryDraft, LogCategory, LogCounts, LogEntry, LogFilter, LogLevel};
use crate::dispatch::{EventDraft, WebhookDispatcher};
use crate::error::WatchError;
use crate::monitor::failure::FailureTracker;
use crate::monitor::target::{TargetConfig, TargetId, TargetStatus};
use crate::monitor::WatchSupervisor;
use crate::page_agent::{ContentMode, PageAgent, PageAgentError, PageRef};
use crate::settings::EngineSettings;
use crate::store::{ConfigStore, GlobalConfig, MonitoringDefaults};

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A start request as the UI submits it: target fields minus generated
/// state, with interval and change detection optional so the configured
/// monitoring defaults can fill them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTargetRequest {
    pub page_ref: PageRef,
    pub initial_url: String,
    pub selector: String,
    #[serde(default)]
    pub content_mode: Option<ContentMode>,
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub change_detection: Option<bool>,
    #[serde(default)]
    pub webhook_override: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
}

/// An ad-hoc "send now" request: either an existing target id or enough
/// fields to extract once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNowRequest {
    #[serde(default)]
    pub target_id: Option<TargetId>,
    #[serde(default)]
    pub page_ref: Option<PageRef>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub content_mode: Option<ContentMode>,
    #[serde(default)]
    pub webhook_override: Option<String>,
}

pub struct Engine {
    settings: EngineSettings,
    store: Arc<dyn ConfigStore>,
    agent: Arc<dyn PageAgent>,
    log: Arc<ActivityLog>,
    supervisor: WatchSupervisor,
    failures: Arc<FailureTracker>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn ConfigStore>,
        agent: Arc<dyn PageAgent>,
    ) -> Self {
        let log = Arc::new(ActivityLog::new(Arc::clone(&store), settings.log_capacity));
        let dispatcher = Arc::new(WebhookDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&log),
            settings.default_webhook_url.clone(),
            settings.timing.webhook_timeout,
        ));
        let failures = Arc::new(FailureTracker::new(settings.failure_threshold));
        let supervisor = WatchSupervisor::new(
            Arc::clone(&agent),
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&log),
            Arc::clone(&failures),
            settings.clone(),
        );
        Self {
            settings,
            store,
            agent,
            log,
            supervisor,
            failures,
        }
    }

    /// Brings the engine up: replays the persisted activity log tail, then
    /// restores previously enabled targets. Call once at process start.
    pub async fn start(&self) {
        self.log.restore().await;
        self.log
            .append(EntryDraft::new(
                LogLevel::Info,
                LogCategory::System,
                "engine started",
            ))
            .await;
        self.supervisor.restore_from_store().await;
        info!("engine started");
    }

    /// Stops every live target and records the shutdown.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        self.log
            .append(EntryDraft::new(
                LogLevel::Info,
                LogCategory::System,
                "engine stopped",
            ))
            .await;
        info!("engine stopped");
    }

    pub fn supervisor(&self) -> &WatchSupervisor {
        &self.supervisor
    }

    pub fn activity_log(&self) -> &Arc<ActivityLog> {
        &self.log
    }

    async fn monitoring_defaults(&self) -> MonitoringDefaults {
        self.store
            .load_global()
            .await
            .ok()
            .flatten()
            .and_then(|g| g.defaults)
            .unwrap_or(self.settings.defaults)
    }

    pub async fn start_target(&self, request: StartTargetRequest) -> Result<TargetId, WatchError> {
        let defaults = self.monitoring_defaults().await;
        let config = TargetConfig {
            page_ref: request.page_ref,
            initial_url: request.initial_url,
            selector: request.selector,
            content_mode: request.content_mode.unwrap_or(ContentMode::Markup),
            interval_ms: request.interval_ms.unwrap_or(defaults.refresh_interval_ms),
            change_detection: request.change_detection.unwrap_or(defaults.change_detection),
            webhook_override: request.webhook_override,
            profile_name: request.profile_name,
        };
        self.supervisor.start_target(config).await
    }

    pub async fn stop_target(&self, id: &TargetId) -> Result<(), WatchError> {
        self.supervisor.stop_target(id).await
    }

    pub async fn status(&self, id: &TargetId) -> Result<TargetStatus, WatchError> {
        self.supervisor.status(id).await
    }

    pub fn status_all(&self) -> Vec<TargetId> {
        self.supervisor.status_all()
    }

    /// One immediate extract-and-dispatch, outside any schedule: change
    /// detection is bypassed (`changeDetected: true`), `last_hash` is left
    /// alone, and the failure tracker never hears about it.
    pub async fn send_now(&self, request: SendNowRequest) -> Result<(), WatchError> {
        let (page_ref, selector, mode, target_override, interval_ms, fallback_url, target_id) =
            match &request.target_id {
                Some(id) => {
                    let config = match self.supervisor.live_config(id) {
                        Some(config) => config,
                        None => self.supervisor.status(id).await?.config,
                    };
                    (
                        config.page_ref,
                        config.selector,
                        config.content_mode,
                        config.webhook_override,
                        config.interval_ms,
                        config.initial_url,
                        Some(id.clone()),
                    )
                }
                None => {
                    let page_ref = request.page_ref.ok_or(PageAgentError::PageGone)?;
                    let selector = request
                        .selector
                        .filter(|s| !s.trim().is_empty())
                        .ok_or(WatchError::InvalidSelector)?;
                    let defaults = self.monitoring_defaults().await;
                    (
                        page_ref,
                        selector,
                        request.content_mode.unwrap_or(ContentMode::Markup),
                        None,
                        defaults.refresh_interval_ms,
                        String::new(),
                        None,
                    )
                }
            };

        if let Err(e) = self.agent.ensure_ready(&page_ref).await {
            // Best effort; the extract below reports the real failure.
            tracing::debug!(page = %page_ref, error = %e, "page agent not ready for send-now");
        }
        let url = match self.agent.current_url(&page_ref).await {
            Ok(live) => live.to_string(),
            Err(_) => fallback_url,
        };

        let raw = self
            .agent
            .extract(&page_ref, &selector, mode)
            .await
            .map_err(WatchError::from)?;
        let content = crate::content::validate_content(&raw, mode)
            .map_err(WatchError::from)?
            .to_owned();

        let draft = EventDraft {
            url,
            content,
            selector,
            change_detected: true,
            refresh_interval_ms: interval_ms,
            tab_id: page_ref.tab_id(),
        };
        self.supervisor
            .dispatcher()
            .dispatch(
                draft,
                request.webhook_override.as_deref(),
                target_override.as_deref(),
                target_id.as_ref(),
            )
            .await?;
        Ok(())
    }

    /// Fires a synthetic event at the given URL (or the configured
    /// default), so a user can verify a webhook before trusting it.
    pub async fn test_webhook(&self, url: Option<String>) -> Result<(), WatchError> {
        let draft = EventDraft {
            url: String::new(),
            content: "pagewatch webhook test event".into(),
            selector: String::new(),
            change_detected: true,
            refresh_interval_ms: self.settings.defaults.refresh_interval_ms,
            tab_id: None,
        };
        self.supervisor
            .dispatcher()
            .dispatch(draft, url.as_deref(), None, None)
            .await?;
        Ok(())
    }

    pub async fn get_activity_log(&self, filter: &LogFilter) -> (Vec<LogEntry>, LogCounts) {
        let entries = self.log.query(filter).await;
        let counts = self.log.counts().await;
        (entries, counts)
    }

    /// Empties the log, resets all failure counters, and drops the
    /// persisted snapshot.
    pub async fn clear_activity_log(&self) {
        self.log.clear().await;
        self.failures.reset_all();
    }

    pub async fn get_global_config(&self) -> Result<GlobalConfig, WatchError> {
        self.supervisor.global_config().await
    }

    pub async fn set_global_config(&self, global: GlobalConfig) -> Result<(), WatchError> {
        self.supervisor.set_global_config(global).await
    }

    pub async fn list_profiles(&self) -> Result<BTreeMap<String, Value>, WatchError> {
        Ok(self.store.list_profiles().await?)
    }

    pub async fn save_profile(&self, name: &str, body: &Value) -> Result<(), WatchError> {
        Ok(self.store.save_profile(name, body).await?)
    }

    pub async fn delete_profile(&self, name: &str) -> Result<(), WatchError> {
        Ok(self.store.delete_profile(name).await?)
    }
}
