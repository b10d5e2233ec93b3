//! The contract the engine consumes to drive and read pages.
//!
//! The engine never owns a rendering environment. Whatever hosts the pages
//! (a browser bridge, a headless renderer, a test double) implements
//! [`PageAgent`], and the supervisor talks to it through this trait alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Opaque handle to a live page, resolved only by the [`PageAgent`].
///
/// In a browser embedding this is a tab id; the engine treats it as a string
/// and only inspects it when rendering the numeric `tabId` payload field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageRef(String);

impl PageRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The handle rendered as an integer, when it is one (browser tab ids).
    pub fn tab_id(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a fragment is read out of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Serialized markup of the selected element.
    Markup,
    /// Visible text of the selected element.
    Text,
}

#[derive(Debug, Error)]
pub enum PageAgentError {
    #[error("page agent is unreachable: {0}")]
    Unreachable(String),
    #[error("page no longer exists")]
    PageGone,
    #[error("page is not a supported http(s) document")]
    UnsupportedPage,
    #[error("no element matches the selector")]
    ElementNotFound,
    #[error("page is still loading")]
    StillLoading,
    #[error("page-side error: {0}")]
    PageError(String),
}

impl PageAgentError {
    /// Stable machine code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            PageAgentError::Unreachable(_) => "page_unreachable",
            PageAgentError::PageGone => "page_gone",
            PageAgentError::UnsupportedPage => "unsupported_page",
            PageAgentError::ElementNotFound => "element_not_found",
            PageAgentError::StillLoading => "page_still_loading",
            PageAgentError::PageError(_) => "page_error",
        }
    }
}

/// The minimal surface the engine consumes from the page host.
///
/// Calls are logically synchronous from the pipeline's perspective but may
/// suspend. The supervisor guarantees at most one in-flight call per
/// `PageRef`; implementations do not need to be re-entrant per page.
#[async_trait]
pub trait PageAgent: Send + Sync {
    /// Makes sure the agent can serve the page (injecting helper code if it
    /// must). Idempotent; the supervisor may call it on every start.
    async fn ensure_ready(&self, page: &PageRef) -> Result<(), PageAgentError>;

    /// Live URL of the page, used for navigation-away detection.
    async fn current_url(&self, page: &PageRef) -> Result<Url, PageAgentError>;

    /// Instructs the page to reload.
    async fn refresh(&self, page: &PageRef) -> Result<(), PageAgentError>;

    /// Whether the page has finished loading. Polled, never awaited forever.
    async fn is_loaded(&self, page: &PageRef) -> bool;

    /// Reads the selector-scoped fragment in the requested mode.
    async fn extract(
        &self,
        page: &PageRef,
        selector: &str,
        mode: ContentMode,
    ) -> Result<String, PageAgentError>;

    /// Enumerates the pages the agent currently knows, with their URLs.
    /// Used once at process start to re-bind persisted targets.
    async fn known_pages(&self) -> Vec<(PageRef, Url)>;
}
