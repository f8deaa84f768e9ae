//! Persistent blob storage for cached aggregations
//!
//! A [`Container`] is one physical store (a directory, or an in-memory map in
//! tests) plus the write locks shared by every view that persists into it.
//! Views colocate in one container under disjoint key prefixes.

pub mod backends;
pub mod config;
pub mod error;
pub mod factory;
pub mod lock;
pub mod traits;

pub use backends::{FileBackend, MemoryBackend};
pub use config::{BackendType, StoreConfig};
pub use error::{StorageError, StorageResult};
pub use factory::StorageFactory;
pub use lock::{KeyLockGuard, KeyLocks};
pub use traits::{join_key, validate_key, BlobStore};

use crate::cache::CacheStore;
use std::sync::Arc;
use std::time::Duration;

/// A blob store and its per-key write locks
pub struct Container {
    backend: Arc<dyn BlobStore>,
    locks: KeyLocks,
}

impl Container {
    pub fn new(backend: impl BlobStore + 'static) -> Arc<Self> {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn BlobStore>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            locks: KeyLocks::new(),
        })
    }

    /// Container backed by a fresh in-memory store
    pub fn in_memory() -> Arc<Self> {
        Self::new(MemoryBackend::default())
    }

    pub fn backend(&self) -> &dyn BlobStore {
        self.backend.as_ref()
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// Cache store scoped to `prefix` inside this container
    pub fn cache_store(self: &Arc<Self>, prefix: &str) -> StorageResult<CacheStore> {
        CacheStore::new(Arc::clone(self), prefix)
    }

    /// Exclusive write access to key for as long as the guard lives
    pub async fn lock(&self, key: &str, timeout: Duration) -> StorageResult<KeyLockGuard> {
        self.locks.acquire(key, timeout).await
    }
}
