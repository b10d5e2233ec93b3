//! Liveness validation: is an extracted fragment a fully loaded result, or a
//! placeholder the page rendered while still fetching?

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::page_agent::ContentMode;

/// Shortest fragment accepted as a real result.
pub const MIN_CONTENT_CHARS: usize = 100;

/// Fewest non-empty lines a `text`-mode fragment must carry.
pub const MIN_TEXT_LINES: usize = 3;

// Literal substrings that mark a half-rendered page.
const LITERAL_MARKERS: [&str; 3] = ["Loading...", "undefined items", "of NaN pages"];

static WORD_MARKERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"\bloading\b").unwrap(), "loading"),
        (Regex::new(r"\bNaN\b").unwrap(), "NaN"),
    ]
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("content is {0} characters, need at least {MIN_CONTENT_CHARS}")]
    TooShort(usize),
    #[error("content contains loading marker {0:?}")]
    LoadingMarker(&'static str),
    #[error("text content has {0} non-empty lines, need at least {MIN_TEXT_LINES}")]
    InsufficientLines(usize),
}

impl ContentError {
    pub fn code(&self) -> &'static str {
        match self {
            ContentError::TooShort(_) => "content_too_short",
            ContentError::LoadingMarker(_) => "content_contains_loading_markers",
            ContentError::InsufficientLines(_) => "content_insufficient_lines",
        }
    }
}

/// Validates raw extracted content and returns the trimmed slice that all
/// downstream hashing and dispatch must use.
pub fn validate_content(raw: &str, mode: ContentMode) -> Result<&str, ContentError> {
    let trimmed = raw.trim();

    let chars = trimmed.chars().count();
    if chars < MIN_CONTENT_CHARS {
        return Err(ContentError::TooShort(chars));
    }

    for marker in LITERAL_MARKERS {
        if trimmed.contains(marker) {
            return Err(ContentError::LoadingMarker(marker));
        }
    }
    for (pattern, label) in WORD_MARKERS.iter() {
        if pattern.is_match(trimmed) {
            return Err(ContentError::LoadingMarker(label));
        }
    }

    if mode == ContentMode::Text {
        let lines = trimmed.lines().filter(|l| !l.trim().is_empty()).count();
        if lines < MIN_TEXT_LINES {
            return Err(ContentError::InsufficientLines(lines));
        }
    }

    Ok(trimmed)
}
