//! In-memory blob store for testing

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::{
    config::{BackendType, StoreConfig},
    error::{StorageError, StorageResult},
    traits::{validate_key, BlobStore},
};

/// In-memory blob store; clones share the same map
#[derive(Clone, Default)]
pub struct MemoryBackend {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new memory backend
    pub fn new(config: &StoreConfig) -> StorageResult<Self> {
        if config.backend != BackendType::Memory {
            return Err(StorageError::configuration(
                "Invalid backend config for memory storage",
            ));
        }
        Ok(Self::default())
    }

    /// Number of stored blobs across all directories
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.blobs
            .write()
            .await
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.blobs.write().await.remove(key).is_some())
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        let dir = dir.trim_matches('/');
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            validate_key(dir)?;
            format!("{dir}/")
        };

        let blobs = self.blobs.read().await;
        Ok(blobs
            .keys()
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}
