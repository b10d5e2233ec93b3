//! Outbound webhook wire shapes.

use serde::Serialize;

/// `type` field of every event this engine emits.
pub const EVENT_TYPE: &str = "page_monitor";

/// The JSON body POSTed to the effective webhook URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// RFC 3339, UTC.
    pub timestamp: String,
    /// The watched page URL.
    pub url: String,
    /// The extracted fragment, byte-identical to what was hashed.
    pub content: String,
    pub selector: String,
    pub change_detected: bool,
    pub metadata: EventMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub refresh_interval: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    /// The URL actually used for this dispatch (unmasked on the wire; the
    /// activity log masks its own copy).
    pub webhook_url: String,
}

/// Everything the caller knows before the effective URL is resolved.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub url: String,
    pub content: String,
    pub selector: String,
    pub change_detected: bool,
    pub refresh_interval_ms: u64,
    pub tab_id: Option<i64>,
}
