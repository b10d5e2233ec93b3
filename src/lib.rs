//! # pagewatch
//!
//! A page-watch engine: give it watch targets (a page, a CSS selector, a
//! polling interval) and it periodically refreshes the page through a
//! [`page_agent::PageAgent`], extracts the selector-scoped fragment,
//! detects changes by content hash, and POSTs a JSON event to a webhook
//! when something changed. Targets that keep failing are stopped
//! automatically, and every operationally significant event lands in a
//! bounded, queryable, restart-surviving activity log.
//!
//! The crate is a library. The rendering environment (a browser bridge, a
//! headless renderer) is supplied by the embedder as a [`page_agent::PageAgent`]
//! implementation, and persistence as a [`store::ConfigStore`] (a JSON file
//! store and an in-memory store ship in the box).
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagewatch::{Engine, EngineSettings, JsonFileStore};
//! # fn agent() -> Arc<dyn pagewatch::page_agent::PageAgent> { unimplemented!() }
//!
//! # async fn run() {
//! let store = Arc::new(JsonFileStore::new("pagewatch.json"));
//! let engine = Engine::new(EngineSettings::default(), store, agent());
//! engine.start().await; // restores the log tail and enabled targets
//! # }
//! ```

pub mod activity;
pub mod api;
pub mod content;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod page_agent;
pub mod settings;
pub mod store;

pub use activity::{ActivityLog, LogCategory, LogEntry, LogFilter, LogLevel};
pub use api::{dispatch_command, Command};
pub use engine::{Engine, SendNowRequest, StartTargetRequest};
pub use error::WatchError;
pub use monitor::target::{TargetConfig, TargetId, TargetStatus};
pub use monitor::WatchSupervisor;
pub use page_agent::{ContentMode, PageAgent, PageAgentError, PageRef};
pub use settings::{CycleTiming, EngineSettings};
pub use store::{ConfigStore, GlobalConfig, JsonFileStore, MemoryStore};
