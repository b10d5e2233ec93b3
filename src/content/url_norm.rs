//! URL normalization used for restart-matching and navigation-away checks.

use url::Url;

/// Canonical string form of a URL for equality checks: scheme and host
/// lowercased, fragment dropped, query preserved, trailing slash stripped.
pub fn normalize(url: &Url) -> String {
    let mut out = String::with_capacity(url.as_str().len());
    out.push_str(url.scheme());
    out.push_str("://");
    if let Some(host) = url.host_str() {
        out.push_str(&host.to_ascii_lowercase());
    }
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    out
}

/// Parses and normalizes in one step. `None` when the input is not a URL.
pub fn normalize_str(raw: &str) -> Option<String> {
    Url::parse(raw).ok().map(|u| normalize(&u))
}

/// Whether the URL uses a scheme the engine will watch or post to.
pub fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
