//! Per-key write locks shared by every view of a container

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use super::error::{StorageError, StorageResult};

/// Lock table with one async mutex per key
///
/// Writers of the same key are serialized; writers and readers of other
/// keys never wait on each other.
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for exclusive access to key
    pub async fn acquire(&self, key: &str, timeout: Duration) -> StorageResult<KeyLockGuard> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // forget locks nobody holds or waits on
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };

        let waiting = Instant::now();
        let guard = tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| StorageError::Timeout(timeout))?;

        trace!("Acquired write lock on {} after {:.2?}", key, waiting.elapsed());
        Ok(KeyLockGuard {
            key: key.to_string(),
            acquired_at: Instant::now(),
            _guard: guard,
        })
    }

    /// Number of keys with a live lock
    pub async fn held(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|l| l.try_lock().is_err())
            .count()
    }
}

/// Exclusive write access to one key; released on drop
pub struct KeyLockGuard {
    key: String,
    acquired_at: Instant,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLockGuard {
    /// How long the lock has been held
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        trace!("Released write lock on {} after {:.2?}", self.key, self.held_for());
    }
}
