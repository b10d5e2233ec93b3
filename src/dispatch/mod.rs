//! Webhook dispatch: effective-URL resolution, the single POST, and result
//! classification.

use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::activity::{ActivityLog, EntryDraft, LogCategory, LogLevel};
use crate::content::url_norm;
use crate::monitor::target::TargetId;
use crate::store::ConfigStore;

pub mod payload;

pub use payload::{EventDraft, EventMetadata, MonitorEvent, EVENT_TYPE};

/// Sentinel left by setup forms; treated as "no webhook configured".
pub const WEBHOOK_PLACEHOLDER: &str = "YOUR_WEBHOOK_URL";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no webhook URL is configured")]
    NoWebhook,
    #[error("webhook returned HTTP {0}")]
    Http(u16),
    #[error("webhook request timed out")]
    Timeout,
    #[error("webhook network error: {0}")]
    Network(#[source] reqwest::Error),
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::NoWebhook => "no_webhook_configured",
            DispatchError::Http(_) => "webhook_http_error",
            DispatchError::Timeout => "webhook_timeout",
            DispatchError::Network(_) => "webhook_network_error",
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DispatchError::Timeout
        } else {
            DispatchError::Network(e)
        }
    }
}

/// Picks the URL a dispatch will use: explicit caller override, then the
/// target's override, then the global default. Empty strings and the
/// placeholder sentinel read as unset; a candidate that is not an absolute
/// http(s) URL is skipped. No usable candidate at all is
/// `no_webhook_configured`.
pub fn resolve_effective_webhook(
    explicit: Option<&str>,
    target_override: Option<&str>,
    global: Option<&str>,
) -> Result<Url, DispatchError> {
    for candidate in [explicit, target_override, global].into_iter().flatten() {
        let candidate = candidate.trim();
        if candidate.is_empty() || candidate == WEBHOOK_PLACEHOLDER {
            continue;
        }
        if let Ok(url) = Url::parse(candidate) {
            if url_norm::is_http(&url) {
                return Ok(url);
            }
        }
    }
    Err(DispatchError::NoWebhook)
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
    store: Arc<dyn ConfigStore>,
    log: Arc<ActivityLog>,
    /// Engine-level default used when the store has no global webhook.
    fallback_webhook: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        log: Arc<ActivityLog>,
        fallback_webhook: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("default reqwest client"); // Should not fail with default settings
        Self {
            client,
            store,
            log,
            fallback_webhook,
        }
    }

    /// The configured global default, read fresh so settings changes take
    /// effect without a restart. A store read failure reads as "no data".
    async fn global_webhook(&self) -> Option<String> {
        let stored = self
            .store
            .load_global()
            .await
            .ok()
            .flatten()
            .and_then(|g| g.webhook_url);
        stored.or_else(|| self.fallback_webhook.clone())
    }

    /// Resolves the effective URL, posts the event once, classifies the
    /// result, and records the outcome in the activity log. No retries at
    /// this level; repeated failures accumulate in the failure tracker
    /// through subsequent cycles.
    pub async fn dispatch(
        &self,
        draft: EventDraft,
        explicit_override: Option<&str>,
        target_override: Option<&str>,
        target_id: Option<&TargetId>,
    ) -> Result<(), DispatchError> {
        let global = self.global_webhook().await;
        let url = match resolve_effective_webhook(
            explicit_override,
            target_override,
            global.as_deref(),
        ) {
            Ok(url) => url,
            Err(e) => {
                let mut entry = EntryDraft::new(
                    LogLevel::Error,
                    LogCategory::Webhook,
                    "dispatch failed: no webhook URL is configured",
                )
                .detail("event", "failed")
                .detail("code", e.code());
                if let Some(id) = target_id {
                    entry = entry.target(id);
                }
                self.log.append(entry.url(draft.url.clone())).await;
                return Err(e);
            }
        };

        let event = MonitorEvent {
            event_type: EVENT_TYPE,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            url: draft.url.clone(),
            content: draft.content,
            selector: draft.selector,
            change_detected: draft.change_detected,
            metadata: EventMetadata {
                refresh_interval: draft.refresh_interval_ms,
                tab_id: draft.tab_id,
                webhook_url: url.to_string(),
            },
        };

        let content_length = event.content.chars().count();
        let outcome = match self.client.post(url.clone()).json(&event).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(DispatchError::Http(response.status().as_u16())),
            Err(e) => Err(DispatchError::from(e)),
        };

        match &outcome {
            Ok(()) => {
                info!(url = %url.host_str().unwrap_or_default(), content_length, "webhook delivered");
                let mut entry = EntryDraft::new(
                    LogLevel::Success,
                    LogCategory::Webhook,
                    "webhook event delivered",
                )
                .detail("event", "sent")
                .detail("contentLength", content_length)
                .detail("changeDetected", event.change_detected)
                .detail("webhookUrl", url.as_str())
                .url(event.url.clone());
                if let Some(id) = target_id {
                    entry = entry.target(id);
                }
                self.log.append(entry).await;
            }
            Err(e) => {
                warn!(code = e.code(), "webhook delivery failed");
                let mut entry = EntryDraft::new(
                    LogLevel::Error,
                    LogCategory::Webhook,
                    format!("webhook delivery failed: {e}"),
                )
                .detail("event", "failed")
                .detail("code", e.code())
                .detail("webhookUrl", url.as_str())
                .url(event.url.clone());
                if let DispatchError::Http(status) = e {
                    entry = entry.detail("status", *status);
                }
                if let Some(id) = target_id {
                    entry = entry.target(id);
                }
                self.log.append(entry).await;
            }
        }
        outcome
    }
}
