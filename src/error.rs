//! Crate-wide error type with stable machine codes.
//!
//! Every failure surfaced through the command API carries a short
//! machine-readable code alongside the human message; the codes are part of
//! the engine's contract and never change between releases.

use thiserror::Error;

use crate::content::ContentError;
use crate::dispatch::DispatchError;
use crate::monitor::target::TargetId;
use crate::page_agent::{PageAgentError, PageRef};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum WatchError {
    // Configuration.
    #[error("selector must not be empty")]
    InvalidSelector,
    #[error("interval must be at least {min_ms} ms, got {got_ms} ms")]
    InvalidInterval { got_ms: u64, min_ms: u64 },
    #[error("webhook URL must be an absolute http(s) URL: {0:?}")]
    InvalidWebhookUrl(String),
    #[error("page URL must use http or https: {0:?}")]
    InvalidPageUrl(String),

    // Target lifecycle.
    #[error("no such target: {0}")]
    TargetNotFound(TargetId),
    #[error("a target is already running for page {0}")]
    TargetAlreadyRunning(PageRef),

    #[error(transparent)]
    PageAgent(#[from] PageAgentError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,
}

impl WatchError {
    /// Stable machine code for API responses and log entries.
    pub fn code(&self) -> &'static str {
        match self {
            WatchError::InvalidSelector => "invalid_selector",
            WatchError::InvalidInterval { .. } => "invalid_interval",
            WatchError::InvalidWebhookUrl(_) => "invalid_webhook_url",
            WatchError::InvalidPageUrl(_) => "invalid_page_url",
            WatchError::TargetNotFound(_) => "target_not_found",
            WatchError::TargetAlreadyRunning(_) => "target_already_running",
            WatchError::PageAgent(e) => e.code(),
            WatchError::Content(e) => e.code(),
            WatchError::Dispatch(e) => e.code(),
            WatchError::Persistence(_) => "persistence_error",
            WatchError::Cancelled => "cancelled",
        }
    }
}
