//! Shared test fixtures: a scripted page agent and fast engine settings.
#![allow(dead_code)] // each test binary uses a subset of these helpers

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use pagewatch::page_agent::{ContentMode, PageAgent, PageAgentError, PageRef};
use pagewatch::store::MonitoringDefaults;
use pagewatch::{CycleTiming, EngineSettings};

pub struct PageState {
    pub url: Url,
    pub content: String,
    pub loaded: bool,
    pub missing_element: bool,
}

/// A page agent whose pages the test script mutates between cycles.
#[derive(Default)]
pub struct ScriptedAgent {
    pages: Mutex<HashMap<PageRef, PageState>>,
    refreshes: AtomicU32,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, page: &str, url: &str, content: &str) {
        self.pages.lock().unwrap().insert(
            PageRef::new(page),
            PageState {
                url: Url::parse(url).unwrap(),
                content: content.to_owned(),
                loaded: true,
                missing_element: false,
            },
        );
    }

    pub fn set_content(&self, page: &str, content: &str) {
        let mut pages = self.pages.lock().unwrap();
        pages.get_mut(&PageRef::new(page)).unwrap().content = content.to_owned();
    }

    pub fn set_url(&self, page: &str, url: &str) {
        let mut pages = self.pages.lock().unwrap();
        pages.get_mut(&PageRef::new(page)).unwrap().url = Url::parse(url).unwrap();
    }

    pub fn set_missing_element(&self, page: &str, missing: bool) {
        let mut pages = self.pages.lock().unwrap();
        pages.get_mut(&PageRef::new(page)).unwrap().missing_element = missing;
    }

    pub fn remove_page(&self, page: &str) {
        self.pages.lock().unwrap().remove(&PageRef::new(page));
    }

    pub fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageAgent for ScriptedAgent {
    async fn ensure_ready(&self, page: &PageRef) -> Result<(), PageAgentError> {
        let pages = self.pages.lock().unwrap();
        match pages.get(page) {
            Some(state) if matches!(state.url.scheme(), "http" | "https") => Ok(()),
            Some(_) => Err(PageAgentError::UnsupportedPage),
            None => Err(PageAgentError::PageGone),
        }
    }

    async fn current_url(&self, page: &PageRef) -> Result<Url, PageAgentError> {
        let pages = self.pages.lock().unwrap();
        pages
            .get(page)
            .map(|state| state.url.clone())
            .ok_or(PageAgentError::PageGone)
    }

    async fn refresh(&self, page: &PageRef) -> Result<(), PageAgentError> {
        let pages = self.pages.lock().unwrap();
        if !pages.contains_key(page) {
            return Err(PageAgentError::PageGone);
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_loaded(&self, page: &PageRef) -> bool {
        let pages = self.pages.lock().unwrap();
        pages.get(page).map(|state| state.loaded).unwrap_or(false)
    }

    async fn extract(
        &self,
        page: &PageRef,
        _selector: &str,
        _mode: ContentMode,
    ) -> Result<String, PageAgentError> {
        let pages = self.pages.lock().unwrap();
        let state = pages.get(page).ok_or(PageAgentError::PageGone)?;
        if state.missing_element {
            return Err(PageAgentError::ElementNotFound);
        }
        Ok(state.content.clone())
    }

    async fn known_pages(&self) -> Vec<(PageRef, Url)> {
        let pages = self.pages.lock().unwrap();
        pages
            .iter()
            .map(|(page, state)| (page.clone(), state.url.clone()))
            .collect()
    }
}

/// Engine settings with millisecond-scale delays so scenarios complete
/// quickly. The production defaults stay covered by the settings tests.
pub fn fast_settings(webhook: Option<String>) -> EngineSettings {
    EngineSettings {
        default_webhook_url: webhook,
        defaults: MonitoringDefaults {
            refresh_interval_ms: 60_000,
            change_detection: true,
        },
        failure_threshold: 5,
        log_capacity: 100,
        min_interval_ms: 20,
        timing: CycleTiming {
            ready_poll: Duration::from_millis(5),
            ready_ceiling: Duration::from_millis(50),
            extract_initial_delay: Duration::from_millis(1),
            extract_retry_delay: Duration::from_millis(5),
            extract_attempts: 2,
            webhook_timeout: Duration::from_secs(5),
        },
    }
}

/// Content long enough to pass liveness validation.
pub fn page_content(tag: &str, n: usize) -> String {
    format!("{tag} {}", "x".repeat(n))
}

/// Opt-in tracing output for debugging a failing scenario:
/// `RUST_LOG=pagewatch=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `cond` until it holds or a 5 s deadline passes.
pub async fn wait_for<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if cond().await {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
