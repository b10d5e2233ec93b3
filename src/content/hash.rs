//! Content digesting for change detection.

use sha2::{Digest, Sha256};

/// SHA-256 over the UTF-8 bytes of the (already trimmed) content, rendered
/// as lowercase hex. Deterministic, O(n) in the content length.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
