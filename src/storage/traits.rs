//! Core trait for the hierarchical blob store

use async_trait::async_trait;

use super::config::BackendType;
use super::error::{StorageError, StorageResult};

/// Hierarchical blob namespace
///
/// Keys are `/`-separated paths such as `view_1/count`. A successful
/// `write` is durable and replaces the previous blob as a whole: readers see
/// either the old blob or the new one, never a mix.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend kind, for diagnostics
    fn backend_type(&self) -> BackendType;

    /// Read a blob, `None` if the key holds nothing
    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replace the blob stored at key
    async fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()>;

    /// Remove a blob, returning whether one existed
    async fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Names of the blobs stored directly under dir (not in nested dirs)
    async fn list(&self, dir: &str) -> StorageResult<Vec<String>>;
}

/// Check that key is a relative path of non-empty, non-dot segments
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains(['\\', '\0']) {
        return Err(StorageError::invalid_key(key));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment.starts_with('.') {
            return Err(StorageError::invalid_key(key));
        }
    }
    Ok(())
}

/// Join a directory prefix and an entry name into a key
pub fn join_key(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
