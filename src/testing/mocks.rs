//! Fault-injecting collaborators for fill and commit tests

use crate::cluster::{ClusterSession, JobFn, PartialResult};
use crate::error::ChunkFailure;
use crate::fill::planning::Chunk;
use crate::storage::{BackendType, BlobStore, MemoryBackend, StorageError, StorageResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cluster that completes jobs in reverse chunk order
///
/// Chunk `i` of `expected` finishes after `(expected - i)` delay steps, so
/// the last chunk comes back first.
pub struct ReorderingCluster {
    expected: usize,
    step: Duration,
    completed: Arc<Mutex<Vec<usize>>>,
    dashboard: Option<String>,
}

impl ReorderingCluster {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            step: Duration::from_millis(10),
            completed: Arc::new(Mutex::new(Vec::new())),
            dashboard: None,
        }
    }

    pub fn with_dashboard(mut self, url: &str) -> Self {
        self.dashboard = Some(url.to_string());
        self
    }

    /// Chunk indices in the order their jobs finished
    pub fn completion_order(&self) -> Vec<usize> {
        self.completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ClusterSession for ReorderingCluster {
    fn submit(
        &self,
        chunk: &Chunk,
        job: JobFn,
    ) -> BoxFuture<'static, Result<PartialResult, ChunkFailure>> {
        let index = chunk.index;
        let steps = self.expected.saturating_sub(index) as u32;
        let delay = self.step * steps;
        let completed = self.completed.clone();

        async move {
            tokio::time::sleep(delay).await;
            let result = job();
            completed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(index);
            result
        }
        .boxed()
    }

    fn dashboard_link(&self) -> Option<String> {
        self.dashboard.clone()
    }
}

/// In-memory store whose writes can be made to fail on demand
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryBackend,
    failing: Arc<Mutex<HashMap<String, usize>>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` writes to `key`
    pub fn fail_writes(&self, key: &str, times: usize) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), times);
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    fn should_fail(&self, key: &str) -> bool {
        let mut failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        match failing.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()> {
        if self.should_fail(key) {
            return Err(StorageError::unavailable(format!("injected write failure for {key}")));
        }
        self.inner.write(key, blob).await
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.inner.remove(key).await
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        self.inner.list(dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_store_fails_requested_writes_only() {
        let store = FlakyStore::new();
        store.fail_writes("v/a", 1);

        assert!(store.write("v/a", b"1").await.is_err());
        store.write("v/a", b"2").await.unwrap();
        store.write("v/b", b"3").await.unwrap();
        assert_eq!(store.read("v/a").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_reordering_cluster_finishes_last_chunk_first() {
        let cluster = ReorderingCluster::new(3);
        let futures: Vec<_> = (0..3)
            .map(|i| {
                let chunk = Chunk {
                    index: i,
                    first: i,
                    locations: vec![],
                };
                let job: JobFn = Box::new(move || {
                    Ok(PartialResult {
                        chunk: i,
                        accumulators: vec![],
                        locations: vec![],
                    })
                });
                cluster.submit(&chunk, job)
            })
            .collect();

        futures::future::join_all(futures).await;
        assert_eq!(cluster.completion_order(), vec![2, 1, 0]);
    }
}
