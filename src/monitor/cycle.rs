//! One watch cycle: refresh, wait for readiness, extract with retries,
//! validate, hash, decide, dispatch, persist. The supervisor runs exactly
//! one of these at a time per target.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::activity::{ActivityLog, EntryDraft, LogCategory, LogLevel};
use crate::content::{content_digest, url_norm, validate_content};
use crate::dispatch::{EventDraft, WebhookDispatcher};
use crate::page_agent::{PageAgent, PageAgentError};
use crate::settings::CycleTiming;
use crate::store::ConfigStore;

use super::target::TargetRecord;

/// Shared handles a target task needs to run its cycles.
pub(crate) struct CycleEnv {
    pub agent: Arc<dyn PageAgent>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub log: Arc<ActivityLog>,
    pub store: Arc<dyn ConfigStore>,
    pub timing: CycleTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// Baseline recorded, nothing changed, or a change was dispatched.
    Success,
    /// Extraction budget exhausted or dispatch failed; counts toward
    /// auto-stop.
    Failure,
    /// A stop arrived mid-cycle. Nothing was dispatched or persisted after
    /// the signal.
    Cancelled,
    /// The page now shows a different URL; the supervisor must stop the
    /// target.
    NavigatedAway,
    /// The page ref no longer resolves; the supervisor must stop the
    /// target.
    PageGone,
}

fn stop_requested(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

/// Sleeps for `delay` unless a stop arrives first.
async fn wait_or_cancel(
    delay: std::time::Duration,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(), ()> {
    tokio::select! {
        biased;
        _ = cancel.wait_for(|stopped| *stopped) => Err(()),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Persists a target record, retrying once in place. On a second failure
/// the in-memory record stays authoritative and a warning is logged.
pub(crate) async fn persist_record(
    store: &Arc<dyn ConfigStore>,
    log: &ActivityLog,
    record: &TargetRecord,
) {
    let first = match store.save_target(record).await {
        Ok(()) => return,
        Err(e) => e,
    };
    debug!(target = %record.id, error = %first, "target persist failed, retrying");
    if let Err(e) = store.save_target(record).await {
        warn!(target = %record.id, error = %e, "target state not persisted");
        log.append(
            EntryDraft::new(
                LogLevel::Warning,
                LogCategory::System,
                "target state could not be persisted; in-memory state stays authoritative",
            )
            .target(&record.id)
            .detail("code", "persistence_error"),
        )
        .await;
    }
}

pub(crate) async fn run_cycle(
    env: &CycleEnv,
    record: &mut TargetRecord,
    cancel: &mut watch::Receiver<bool>,
) -> CycleOutcome {
    let target_id = record.id.clone();
    let page = record.config.page_ref.clone();

    if stop_requested(cancel) {
        return CycleOutcome::Cancelled;
    }

    // Refreshing a page the user has navigated elsewhere would hijack their
    // browsing; the URL check gates the rest of the cycle.
    match env.agent.current_url(&page).await {
        Ok(live) => {
            let expected = url_norm::normalize_str(&record.config.initial_url);
            if expected.as_deref() != Some(url_norm::normalize(&live).as_str()) {
                return CycleOutcome::NavigatedAway;
            }
        }
        Err(PageAgentError::PageGone) => return CycleOutcome::PageGone,
        Err(e) => {
            env.log
                .append(
                    EntryDraft::new(
                        LogLevel::Warning,
                        LogCategory::PageAgent,
                        format!("could not read page URL: {e}"),
                    )
                    .target(&target_id)
                    .detail("code", e.code()),
                )
                .await;
        }
    }

    match env.agent.refresh(&page).await {
        Ok(()) => {}
        Err(PageAgentError::PageGone) => return CycleOutcome::PageGone,
        Err(e) => {
            env.log
                .append(
                    EntryDraft::new(
                        LogLevel::Warning,
                        LogCategory::PageAgent,
                        format!("page refresh failed: {e}"),
                    )
                    .target(&target_id)
                    .detail("code", e.code()),
                )
                .await;
        }
    }

    // Poll readiness up to the ceiling, then proceed regardless; the
    // extract retry loop absorbs a page that is genuinely still loading.
    let deadline = tokio::time::Instant::now() + env.timing.ready_ceiling;
    while !env.agent.is_loaded(&page).await {
        if tokio::time::Instant::now() >= deadline {
            debug!(target = %target_id, "readiness ceiling reached, extracting anyway");
            break;
        }
        if wait_or_cancel(env.timing.ready_poll, cancel).await.is_err() {
            return CycleOutcome::Cancelled;
        }
    }

    // Settle delay for client-side rendering.
    if wait_or_cancel(env.timing.extract_initial_delay, cancel)
        .await
        .is_err()
    {
        return CycleOutcome::Cancelled;
    }

    let attempts = env.timing.extract_attempts.max(1);
    let mut last_code = "element_not_found";
    let mut content: Option<String> = None;
    for attempt in 1..=attempts {
        match env
            .agent
            .extract(&page, &record.config.selector, record.config.content_mode)
            .await
        {
            Ok(raw) => match validate_content(&raw, record.config.content_mode) {
                Ok(trimmed) => {
                    content = Some(trimmed.to_owned());
                    break;
                }
                Err(e) => {
                    last_code = e.code();
                    debug!(target = %target_id, attempt, code = last_code, "extracted content rejected");
                }
            },
            Err(PageAgentError::PageGone) => return CycleOutcome::PageGone,
            Err(e) => {
                last_code = e.code();
                debug!(target = %target_id, attempt, code = last_code, "extract attempt failed");
            }
        }
        if attempt < attempts
            && wait_or_cancel(env.timing.extract_retry_delay, cancel)
                .await
                .is_err()
        {
            return CycleOutcome::Cancelled;
        }
    }

    let Some(content) = content else {
        env.log
            .append(
                EntryDraft::new(
                    LogLevel::Error,
                    LogCategory::Extraction,
                    format!("extraction failed after {attempts} attempts"),
                )
                .target(&target_id)
                .url(record.config.initial_url.clone())
                .detail("event", "exhausted")
                .detail("attempts", attempts)
                .detail("code", last_code),
            )
            .await;
        return CycleOutcome::Failure;
    };

    let digest = content_digest(&content);

    enum Decision {
        Baseline,
        Unchanged,
        Changed,
    }
    let decision = if !record.config.change_detection {
        Decision::Changed
    } else {
        match &record.last_hash {
            None => Decision::Baseline,
            Some(prev) if *prev == digest => Decision::Unchanged,
            Some(_) => Decision::Changed,
        }
    };

    // A stop that raced the extract wins: no state mutation, no dispatch.
    if stop_requested(cancel) {
        return CycleOutcome::Cancelled;
    }

    let now_ms = Utc::now().timestamp_millis();
    match decision {
        Decision::Baseline => {
            record.last_hash = Some(digest);
            record.last_check_at = Some(now_ms);
            env.log
                .append(
                    EntryDraft::new(
                        LogLevel::Info,
                        LogCategory::Change,
                        "baseline recorded; the next change will dispatch",
                    )
                    .target(&target_id)
                    .url(record.config.initial_url.clone())
                    .detail("event", "baseline_recorded")
                    .detail("contentLength", content.chars().count()),
                )
                .await;
            persist_record(&env.store, &env.log, record).await;
            CycleOutcome::Success
        }
        Decision::Unchanged => {
            record.last_check_at = Some(now_ms);
            env.log
                .append(
                    EntryDraft::new(LogLevel::Info, LogCategory::Change, "no change detected")
                        .target(&target_id)
                        .detail("event", "none"),
                )
                .await;
            persist_record(&env.store, &env.log, record).await;
            CycleOutcome::Success
        }
        Decision::Changed => {
            record.last_hash = Some(digest);
            if record.config.change_detection {
                env.log
                    .append(
                        EntryDraft::new(
                            LogLevel::Info,
                            LogCategory::Change,
                            "content change detected",
                        )
                        .target(&target_id)
                        .url(record.config.initial_url.clone())
                        .detail("event", "detected")
                        .detail("contentLength", content.chars().count()),
                    )
                    .await;
            }
            let draft = EventDraft {
                url: record.config.initial_url.clone(),
                content,
                selector: record.config.selector.clone(),
                change_detected: true,
                refresh_interval_ms: record.config.interval_ms,
                tab_id: record.config.page_ref.tab_id(),
            };
            let sent = env
                .dispatcher
                .dispatch(
                    draft,
                    None,
                    record.config.webhook_override.as_deref(),
                    Some(&target_id),
                )
                .await;
            // A stop that landed during the POST discards the result.
            if stop_requested(cancel) {
                return CycleOutcome::Cancelled;
            }
            record.last_check_at = Some(now_ms);
            persist_record(&env.store, &env.log, record).await;
            match sent {
                Ok(()) => CycleOutcome::Success,
                // The dispatcher already logged the failure.
                Err(_) => CycleOutcome::Failure,
            }
        }
    }
}
