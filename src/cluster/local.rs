//! In-process worker pool implementing [`ClusterSession`]

use super::{ClusterSession, JobFn, PartialResult};
use crate::error::ChunkFailure;
use crate::fill::job::panic_message;
use crate::fill::planning::Chunk;
use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Runs fill jobs on tokio's blocking pool, at most `max_parallel` at once
pub struct LocalCluster {
    semaphore: Arc<Semaphore>,
    max_parallel: usize,
    dashboard: Option<String>,
}

impl LocalCluster {
    pub fn new(max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_parallel)),
            max_parallel,
            dashboard: None,
        }
    }

    /// Report `url` as this session's monitoring dashboard
    pub fn with_dashboard(mut self, url: impl Into<String>) -> Self {
        self.dashboard = Some(url.into());
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }
}

impl ClusterSession for LocalCluster {
    fn submit(
        &self,
        chunk: &Chunk,
        job: JobFn,
    ) -> BoxFuture<'static, Result<PartialResult, ChunkFailure>> {
        let semaphore = self.semaphore.clone();
        let index = chunk.index;
        let locations = chunk.locations.clone();

        async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| {
                ChunkFailure::new(index, locations.clone(), anyhow!("worker pool closed: {}", e))
            })?;
            debug!("Running chunk {} on local worker", index);

            match tokio::task::spawn_blocking(job).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(ChunkFailure::new(
                    index,
                    locations,
                    anyhow!("worker panicked: {}", panic_message(e.into_panic().as_ref())),
                )),
                Err(e) => Err(ChunkFailure::new(
                    index,
                    locations,
                    anyhow!("worker cancelled: {}", e),
                )),
            }
        }
        .boxed()
    }

    fn dashboard_link(&self) -> Option<String> {
        self.dashboard.clone()
    }
}
