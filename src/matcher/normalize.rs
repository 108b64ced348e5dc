use sha2::{Digest, Sha256};

/// Trim, lowercase and collapse internal whitespace runs to a single space.
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// SHA-256 hex digest of the normalized content.
pub fn content_key(content: &str) -> String {
    content_key_normalized(&normalize_content(content))
}

pub fn content_key_normalized(normalized: &str) -> String {
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}
