//! Content fingerprints used as the deduplication key.

use ring::digest::{digest, SHA256};

/// Length of a hex-encoded SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 64;

/// SHA-256 of the full content, lower-case hex.
///
/// Only the bytes participate; names and timestamps never do.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(digest(&SHA256, data).as_ref())
}

/// Normalize a client-supplied fingerprint, rejecting anything that is not
/// 64 hex characters.
pub fn normalize(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.len() == FINGERPRINT_LEN && candidate.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(candidate.to_ascii_lowercase())
    } else {
        None
    }
}
