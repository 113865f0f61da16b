mod github;
mod local;

pub use github::GitHubStore;
pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The backend answered but refused the write.
    #[error("Backend rejected write ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The backend could not be reached or did not answer in time.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),
    #[error("Object already exists: {0}")]
    Conflict(String),
    #[error("Unexpected backend response: {0}")]
    InvalidResponse(String),
}

/// Where the backend put an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Path as recorded by the backend.
    pub stored_path: String,
    /// Human-viewable reference (web page for the object).
    pub view_ref: String,
    /// Direct download location for the raw bytes.
    pub download_location: String,
}

/// Append-style blob backend. Paths are derived from catalog identifiers,
/// so the bytes are meaningless without the catalog.
///
/// Implementations fail on any non-success and never retry on their own.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        commit_message: &str,
    ) -> Result<StoredObject, ObjectStoreError>;
}

/// Backend path for an object: `{folder}/{id}{extension}`.
pub fn object_path(folder: &str, id: &str, extension: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        format!("{id}{extension}")
    } else {
        format!("{folder}/{id}{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path() {
        assert_eq!(object_path("media", "abc123", ".png"), "media/abc123.png");
        assert_eq!(object_path("/media/", "abc123", ".png"), "media/abc123.png");
        assert_eq!(object_path("", "abc123", ".bin"), "abc123.bin");
    }
}
