//! Fill cycle: plan, partition, dispatch, merge, commit
//!
//! One cycle brings every stale aggregation of a view up to date with the
//! current input list. Only stale aggregations are recomputed, and nothing
//! is committed unless every chunk succeeded and the input list did not
//! change while the cycle ran.

pub mod job;
pub mod merge;
pub mod planning;

pub use job::{FillJob, JobFn, LocationStats, PartialResult};
pub use merge::{MergedResult, OrderedMerger};
pub use planning::{plan_chunks, Chunk};

use crate::cache::CacheStore;
use crate::cluster::ClusterSession;
use crate::error::{ViewError, ViewResult};
use crate::registry::{AggregationDef, Registry};
use crate::source::{DataSource, InputFingerprint};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where fill jobs run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One job after another on the calling task
    Sequential,
    /// Submitted to the enabled cluster session
    Cluster,
}

/// Outcome of one fill cycle
#[derive(Debug, Clone, Serialize)]
pub struct FillReport {
    /// Number of aggregations recomputed and committed
    pub updated: usize,
    pub chunks: usize,
    pub locations_read: usize,
    pub records_read: u64,
    pub per_location: Vec<LocationStats>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub fingerprint: InputFingerprint,
}

impl FillReport {
    fn up_to_date(fingerprint: InputFingerprint, started: Instant) -> Self {
        Self {
            updated: 0,
            chunks: 0,
            locations_read: 0,
            records_read: 0,
            per_location: Vec::new(),
            elapsed: started.elapsed(),
            fingerprint,
        }
    }
}

/// Runs one fill cycle over a view's registry, source and cache
pub struct FillOrchestrator<'a, R> {
    registry: &'a Registry<R>,
    source: &'a Arc<dyn DataSource<R>>,
    cache: &'a CacheStore,
    cluster: Option<&'a Arc<dyn ClusterSession>>,
    chunksize: usize,
}

impl<'a, R: Send + Sync + 'static> FillOrchestrator<'a, R> {
    pub fn new(
        registry: &'a Registry<R>,
        source: &'a Arc<dyn DataSource<R>>,
        cache: &'a CacheStore,
    ) -> Self {
        Self {
            registry,
            source,
            cache,
            cluster: None,
            chunksize: 1,
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&'a Arc<dyn ClusterSession>>) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_chunksize(mut self, chunksize: usize) -> Self {
        self.chunksize = chunksize;
        self
    }

    pub fn mode(&self) -> DispatchMode {
        match self.cluster {
            Some(_) => DispatchMode::Cluster,
            None => DispatchMode::Sequential,
        }
    }

    /// Definitions whose cache entry is missing, unreadable, of another
    /// accumulator type or built from another input list, in declaration order
    pub async fn stale_defs(
        &self,
        fingerprint: &InputFingerprint,
    ) -> ViewResult<Vec<Arc<AggregationDef<R>>>> {
        let mut stale = Vec::new();
        for def in self.registry.iter() {
            if self.cache.is_stale(def, fingerprint).await? {
                stale.push(def.clone());
            }
        }
        Ok(stale)
    }

    pub async fn run(self) -> ViewResult<FillReport> {
        let started = Instant::now();
        if self.chunksize == 0 {
            return Err(ViewError::InvalidChunkSize);
        }

        let locations = self.source.locations().map_err(ViewError::Source)?;
        let fingerprint = InputFingerprint::of(&locations);
        let stale = self.stale_defs(&fingerprint).await?;
        if stale.is_empty() {
            info!(
                "All {} aggregations are up to date for input {}",
                self.registry.len(),
                fingerprint
            );
            return Ok(FillReport::up_to_date(fingerprint, started));
        }
        info!(
            "Filling {} of {} aggregations from {} input files",
            stale.len(),
            self.registry.len(),
            locations.len()
        );

        let chunks = plan_chunks(&locations, self.chunksize)?;
        let chunk_count = chunks.len();
        let defs: Arc<[Arc<AggregationDef<R>>]> = stale.into();
        let merged = self.dispatch(chunks, defs).await?;

        let current = self.source.fingerprint().map_err(ViewError::Source)?;
        if current != fingerprint {
            warn!(
                "Input list changed during fill ({} -> {}), nothing committed",
                fingerprint, current
            );
            return Err(ViewError::StaleFingerprintMismatch {
                planned: fingerprint,
                current,
            });
        }

        let mut updated = 0;
        for (name, acc) in &merged.accumulators {
            self.cache.commit(name, acc.as_ref(), &fingerprint).await?;
            updated += 1;
        }

        let report = FillReport {
            updated,
            chunks: chunk_count,
            locations_read: merged.locations.len(),
            records_read: merged.locations.iter().map(|l| l.records).sum(),
            per_location: merged.locations,
            elapsed: started.elapsed(),
            fingerprint,
        };
        info!(
            "Read {} input files, {} records; updated {} aggregations in {:.2?}",
            report.locations_read, report.records_read, report.updated, report.elapsed
        );
        Ok(report)
    }

    async fn dispatch(
        &self,
        chunks: Vec<Chunk>,
        defs: Arc<[Arc<AggregationDef<R>>]>,
    ) -> ViewResult<MergedResult> {
        let mut merger = OrderedMerger::new(&defs, chunks.len());

        match self.cluster {
            None => {
                debug!("Running {} fill jobs sequentially", chunks.len());
                for chunk in chunks {
                    let job = FillJob::new(chunk, defs.clone(), self.source.clone());
                    let partial = job.run_catching()?;
                    debug!("Chunk {} done, {} records", partial.chunk, partial.records());
                    merger.accept(partial)?;
                }
            }
            Some(cluster) => {
                debug!("Submitting {} fill jobs to cluster", chunks.len());
                let mut pending: FuturesUnordered<_> = chunks
                    .into_iter()
                    .map(|chunk| {
                        let job = FillJob::new(chunk.clone(), defs.clone(), self.source.clone());
                        cluster.submit(&chunk, job.into_job_fn())
                    })
                    .collect();

                while let Some(result) = pending.next().await {
                    let partial = result?;
                    debug!("Chunk {} done, {} records", partial.chunk, partial.records());
                    merger.accept(partial)?;
                }
            }
        }

        merger.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{Counter, Sum};
    use crate::storage::Container;
    use crate::testing::MemorySource;

    fn registry() -> Registry<f64> {
        let mut registry = Registry::new();
        registry
            .declare("count", Counter::default, |_: &f64, c: &mut Counter| {
                c.increment();
                Ok(())
            })
            .unwrap();
        registry
            .declare("sum", Sum::default, |x: &f64, s: &mut Sum| {
                s.add(*x);
                Ok(())
            })
            .unwrap();
        registry
    }

    fn source() -> Arc<dyn DataSource<f64>> {
        Arc::new(
            MemorySource::new()
                .with_file("a", vec![1.0, 2.0])
                .with_file("b", vec![3.0])
                .with_file("c", vec![4.0, 5.0, 6.0]),
        )
    }

    #[tokio::test]
    async fn test_sequential_cycle_commits_everything() {
        let registry = registry();
        let source = source();
        let cache = CacheStore::new(Container::in_memory(), "v").unwrap();

        let report = FillOrchestrator::new(&registry, &source, &cache)
            .with_chunksize(2)
            .run()
            .await
            .unwrap();

        assert_eq!(report.updated, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.locations_read, 3);
        assert_eq!(report.records_read, 6);

        let entry = cache.entry("sum").await.unwrap().unwrap();
        assert_eq!(entry.decode::<Sum>().unwrap().total, 21.0);
    }

    #[tokio::test]
    async fn test_second_cycle_is_noop() {
        let registry = registry();
        let source = source();
        let cache = CacheStore::new(Container::in_memory(), "v").unwrap();

        FillOrchestrator::new(&registry, &source, &cache)
            .run()
            .await
            .unwrap();
        let report = FillOrchestrator::new(&registry, &source, &cache)
            .run()
            .await
            .unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.records_read, 0);
    }

    #[tokio::test]
    async fn test_zero_chunksize_rejected() {
        let registry = registry();
        let source = source();
        let cache = CacheStore::new(Container::in_memory(), "v").unwrap();

        let err = FillOrchestrator::new(&registry, &source, &cache)
            .with_chunksize(0)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ViewError::InvalidChunkSize));
    }

    #[tokio::test]
    async fn test_only_stale_definitions_refilled() {
        let registry = registry();
        let source = source();
        let cache = CacheStore::new(Container::in_memory(), "v").unwrap();
        FillOrchestrator::new(&registry, &source, &cache)
            .run()
            .await
            .unwrap();

        cache.remove("count").await.unwrap();
        let orchestrator = FillOrchestrator::new(&registry, &source, &cache);
        let fp = source.fingerprint().unwrap();
        let stale: Vec<_> = orchestrator
            .stale_defs(&fp)
            .await
            .unwrap()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(stale, vec!["count"]);

        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.updated, 1);
    }

    #[test]
    fn test_mode_follows_cluster() {
        let registry = registry();
        let source = source();
        let cache = CacheStore::new(Container::in_memory(), "v").unwrap();
        let cluster: Arc<dyn ClusterSession> = Arc::new(crate::cluster::LocalCluster::new(2));

        let orchestrator = FillOrchestrator::new(&registry, &source, &cache);
        assert_eq!(orchestrator.mode(), DispatchMode::Sequential);
        let orchestrator = orchestrator.with_cluster(Some(&cluster));
        assert_eq!(orchestrator.mode(), DispatchMode::Cluster);
    }
}
