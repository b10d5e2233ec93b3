//! Activity log row shapes, filters, and webhook-URL masking.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::monitor::target::TargetId;

/// Longest string kept in a `details` value; the rest is cut at append time.
const MAX_DETAIL_CHARS: usize = 500;
/// Most entries kept in a `details` map.
const MAX_DETAIL_KEYS: usize = 16;
/// Longest path prefix preserved by [`mask_webhook_url`].
const MASK_PATH_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    System,
    Monitoring,
    PageAgent,
    Extraction,
    Change,
    Webhook,
    Failure,
}

/// One row of the activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique and monotone within a process run; regenerated across restarts.
    pub id: u64,
    /// Wall clock, unix milliseconds.
    pub timestamp: i64,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

/// An entry before the log assigns id and timestamp and masks details.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    pub target_id: Option<TargetId>,
    pub url: Option<String>,
    pub details: Map<String, Value>,
}

impl EntryDraft {
    pub fn new(level: LogLevel, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            level,
            category,
            message: message.into(),
            target_id: None,
            url: None,
            details: Map::new(),
        }
    }

    pub fn target(mut self, id: &TargetId) -> Self {
        self.target_id = Some(id.clone());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }
}

/// Query filter; supplied predicates compose by AND.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(default)]
    pub target_id: Option<TargetId>,
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub category: Option<LogCategory>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LogFilter {
    pub(crate) fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(id) = &self.target_id {
            if entry.target_id.as_ref() != Some(id) {
                return false;
            }
        }
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        true
    }
}

/// Per-level totals over the current buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogCounts {
    pub info: usize,
    pub success: usize,
    pub warning: usize,
    pub error: usize,
}

/// Rewrites a webhook URL to `scheme://host` plus at most a 20-character
/// path prefix; everything after the prefix becomes `...`. A value that is
/// not a URL becomes `***`. Masking an already-masked value is a no-op.
pub fn mask_webhook_url(raw: &str) -> String {
    if raw == "***" || raw.ends_with("...") {
        return raw.to_owned();
    }
    let Ok(url) = Url::parse(raw) else {
        return "***".to_owned();
    };
    let Some(host) = url.host_str() else {
        return "***".to_owned();
    };
    let path: String = url.path().chars().take(MASK_PATH_CHARS).collect();
    format!("{}://{}{}...", url.scheme(), host, path)
}

/// Masks webhook-URL fields and bounds the size of a `details` map.
/// Applied once, at append time.
pub(crate) fn sanitize_details(details: &mut Map<String, Value>) {
    for (key, value) in details.iter_mut() {
        if key.to_ascii_lowercase().contains("webhook") {
            if let Value::String(s) = value {
                let masked = mask_webhook_url(s);
                *value = Value::String(masked);
            }
        }
        if let Value::String(s) = value {
            if s.chars().count() > MAX_DETAIL_CHARS {
                let mut cut: String = s.chars().take(MAX_DETAIL_CHARS).collect();
                cut.push('…');
                *value = Value::String(cut);
            }
        }
    }
    while details.len() > MAX_DETAIL_KEYS {
        let key = details.keys().next_back().cloned();
        match key {
            Some(k) => details.remove(&k),
            None => break,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_scheme_host_and_short_path_prefix() {
        let masked = mask_webhook_url("https://hooks.example.com/inbox/abc?key=secret");
        assert_eq!(masked, "https://hooks.example.com/inbox/abc...");
    }

    #[test]
    fn mask_truncates_long_paths() {
        let masked =
            mask_webhook_url("https://hooks.example.com/a/very/long/path/with/many/segments");
        assert_eq!(masked, "https://hooks.example.com/a/very/long/path/wi...");
    }

    #[test]
    fn mask_hides_query_and_credentials() {
        let masked = mask_webhook_url("https://hooks.example.com/p?api_key=12345");
        assert!(!masked.contains("12345"));
    }

    #[test]
    fn mask_is_idempotent() {
        let once = mask_webhook_url("https://hooks.example.com/inbox/abcdef0123456789deadbeef");
        let twice = mask_webhook_url(&once);
        assert_eq!(once, twice);

        assert_eq!(mask_webhook_url("***"), "***");
    }

    #[test]
    fn malformed_url_becomes_stars() {
        assert_eq!(mask_webhook_url("not a url at all"), "***");
    }

    #[test]
    fn sanitize_masks_webhook_keys_only() {
        let mut details = Map::new();
        details.insert(
            "webhookUrl".into(),
            Value::String("https://hooks.example.com/inbox?k=s".into()),
        );
        details.insert("contentLength".into(), Value::from(512));
        sanitize_details(&mut details);

        assert_eq!(
            details["webhookUrl"],
            Value::String("https://hooks.example.com/inbox...".into())
        );
        assert_eq!(details["contentLength"], Value::from(512));
    }

    #[test]
    fn sanitize_truncates_oversized_strings() {
        let mut details = Map::new();
        details.insert("content".into(), Value::String("y".repeat(2_000)));
        sanitize_details(&mut details);
        let Value::String(s) = &details["content"] else {
            panic!("expected string");
        };
        assert!(s.chars().count() <= MAX_DETAIL_CHARS + 1);
    }

    #[test]
    fn filter_composes_by_and() {
        let entry = LogEntry {
            id: 1,
            timestamp: 0,
            level: LogLevel::Warning,
            category: LogCategory::Monitoring,
            message: "stopped".into(),
            target_id: Some(TargetId::from("t-1")),
            url: None,
            details: Map::new(),
        };

        let mut filter = LogFilter {
            level: Some(LogLevel::Warning),
            category: Some(LogCategory::Monitoring),
            ..LogFilter::default()
        };
        assert!(filter.matches(&entry));

        filter.target_id = Some(TargetId::from("t-2"));
        assert!(!filter.matches(&entry));
    }
}
