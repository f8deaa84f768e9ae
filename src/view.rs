//! A view: one data source, its declared aggregations and their cache
//!
//! Every aggregation declared on a view fills from the same input list. The
//! view owns the registry, reads and writes its entries under one prefix of
//! a shared [`Container`], and runs fill cycles either sequentially or on an
//! enabled cluster session.

use crate::accumulator::{downcast, Accumulator};
use crate::cache::{CacheLookup, CacheStore, EntryState, EntrySummary};
use crate::cluster::{public_dashboard_link, ClusterSession, LocalCluster};
use crate::config::ViewConfig;
use crate::error::{ViewError, ViewResult};
use crate::fill::{DispatchMode, FillOrchestrator, FillReport};
use crate::registry::{AggregationDef, Registry};
use crate::source::{DataSource, InputFingerprint};
use crate::storage::Container;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cache state of one declared aggregation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AggregationStatus {
    /// Entry built from the current input list
    Filled {
        entries: Option<u64>,
        committed_at: DateTime<Utc>,
    },
    /// Entry present but built from other inputs, of another accumulator
    /// type, or unreadable
    Stale,
    /// Never filled under this prefix
    Unfilled,
}

/// One declared aggregation and its cache state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationInfo {
    pub name: String,
    pub accumulator: &'static str,
    #[serde(flatten)]
    pub status: AggregationStatus,
}

pub struct View<R> {
    source: Arc<dyn DataSource<R>>,
    registry: Registry<R>,
    cache: CacheStore,
    cluster: Option<Arc<dyn ClusterSession>>,
    config: ViewConfig,
    fill_lock: Mutex<()>,
}

impl<R: Send + Sync + 'static> View<R> {
    /// Bind `source` to the entries stored under `prefix` in `container`
    pub fn new(
        source: Arc<dyn DataSource<R>>,
        container: &Arc<Container>,
        prefix: &str,
    ) -> ViewResult<Self> {
        let config = ViewConfig::default();
        let cache = container
            .cache_store(prefix)?
            .with_lock_timeout(config.lock_timeout);
        Ok(Self {
            source,
            registry: Registry::new(),
            cache,
            cluster: None,
            config,
            fill_lock: Mutex::new(()),
        })
    }

    pub fn with_config(mut self, config: ViewConfig) -> ViewResult<Self> {
        config.validate()?;
        self.cache = self.cache.with_lock_timeout(config.lock_timeout);
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn prefix(&self) -> &str {
        self.cache.prefix()
    }

    /// Declare an aggregation, returning how many are now declared
    pub fn declare<A, I, F>(&mut self, name: &str, init: I, fill: F) -> ViewResult<usize>
    where
        A: Accumulator,
        I: Fn() -> A + Send + Sync + 'static,
        F: Fn(&R, &mut A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let count = self.registry.declare(name, init, fill)?;
        debug!(
            "Declared {} ({}) in view {:?}",
            name,
            std::any::type_name::<A>(),
            self.prefix()
        );
        Ok(count)
    }

    /// Declared names, optionally only those with a valid cache entry
    pub async fn list(&self, cached_only: bool) -> ViewResult<Vec<String>> {
        if !cached_only {
            return Ok(self.registry.names());
        }

        let fingerprint = self.fingerprint()?;
        let mut names = Vec::new();
        for def in self.registry.iter() {
            if !self.cache.is_stale(def, &fingerprint).await? {
                names.push(def.name().to_string());
            }
        }
        Ok(names)
    }

    /// Fingerprint of the source's current input list
    pub fn fingerprint(&self) -> ViewResult<InputFingerprint> {
        self.source.fingerprint().map_err(ViewError::Source)
    }

    /// Merged state of `name` if filled for the current input, otherwise a
    /// fresh empty accumulator
    pub async fn get<A: Accumulator>(&self, name: &str) -> ViewResult<CacheLookup<A>> {
        let def = self.registry.require(name)?;
        def.expect_type::<A>()?;
        let fingerprint = self.fingerprint()?;

        match self.cache.valid_entry(def, &fingerprint).await? {
            Some(entry) => Ok(CacheLookup::Filled(entry.decode::<A>()?)),
            None => Ok(CacheLookup::Empty(fresh::<R, A>(def)?)),
        }
    }

    /// Store `acc` as the state of `name` for the current input
    pub async fn put<A: Accumulator>(&self, name: &str, acc: A) -> ViewResult<()> {
        self.registry.require(name)?.expect_type::<A>()?;
        let _cycle = self.fill_lock.lock().await;
        let fingerprint = self.fingerprint()?;
        self.cache.commit(name, &acc, &fingerprint).await?;
        Ok(())
    }

    pub async fn is_stale(&self, name: &str) -> ViewResult<bool> {
        let def = self.registry.require(name)?;
        let fingerprint = self.fingerprint()?;
        Ok(self.cache.is_stale(def, &fingerprint).await?)
    }

    /// Fill every stale aggregation, returning how many were updated
    pub async fn fill_all(&self) -> ViewResult<usize> {
        Ok(self.fill_with_report().await?.updated)
    }

    pub async fn fill_with_report(&self) -> ViewResult<FillReport> {
        self.fill_with_chunksize(self.config.chunksize).await
    }

    /// Fill with an explicit number of input files per job
    pub async fn fill_with_chunksize(&self, chunksize: usize) -> ViewResult<FillReport> {
        let _cycle = self.fill_lock.lock().await;

        let orchestrator = FillOrchestrator::new(&self.registry, &self.source, &self.cache)
            .with_cluster(self.cluster.as_ref())
            .with_chunksize(chunksize);
        if orchestrator.mode() == DispatchMode::Cluster {
            if let Some(link) = self.dashboard_link() {
                info!("Follow fill progress on the cluster dashboard at {}", link);
            }
        }

        match orchestrator.run().await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!("Fill of view {:?} failed: {}", self.prefix(), e);
                Err(e)
            }
        }
    }

    /// Route fill jobs through `session` from now on
    pub fn enable_cluster(&mut self, session: Arc<dyn ClusterSession>) {
        self.cluster = Some(session);
        info!("Cluster dispatch enabled for view {:?}", self.prefix());
    }

    /// Enable an in-process worker pool sized by `max_parallel`
    pub fn enable_local_cluster(&mut self) {
        let pool = LocalCluster::new(self.config.max_parallel);
        self.enable_cluster(Arc::new(pool));
    }

    /// Go back to sequential fills, returning the previous session
    pub fn disable_cluster(&mut self) -> Option<Arc<dyn ClusterSession>> {
        let previous = self.cluster.take();
        if previous.is_some() {
            info!("Cluster dispatch disabled for view {:?}", self.prefix());
        }
        previous
    }

    pub fn cluster_enabled(&self) -> bool {
        self.cluster.is_some()
    }

    /// Dashboard of the enabled session, reachable from other machines
    pub fn dashboard_link(&self) -> Option<String> {
        self.cluster
            .as_ref()?
            .dashboard_link()
            .map(|link| public_dashboard_link(&link))
    }

    /// Every entry stored under this view's prefix
    pub async fn cached_entries(&self) -> ViewResult<Vec<EntrySummary>> {
        Ok(self.cache.summaries().await?)
    }

    /// Declared aggregations with their cache state, in declaration order
    pub async fn describe(&self) -> ViewResult<Vec<AggregationInfo>> {
        let fingerprint = self.fingerprint()?;
        let mut infos = Vec::with_capacity(self.registry.len());

        for def in self.registry.iter() {
            let status = match self.cache.lookup(def, &fingerprint).await? {
                EntryState::Valid(entry) => AggregationStatus::Filled {
                    entries: entry.entries,
                    committed_at: entry.committed_at,
                },
                EntryState::Stale => AggregationStatus::Stale,
                EntryState::Missing => AggregationStatus::Unfilled,
            };
            infos.push(AggregationInfo {
                name: def.name().to_string(),
                accumulator: def.accumulator_name(),
                status,
            });
        }
        Ok(infos)
    }

    /// Remove every entry under this view's prefix
    pub async fn clear_cache(&self) -> ViewResult<usize> {
        let _cycle = self.fill_lock.lock().await;
        let removed = self.cache.clear().await?;
        info!("Cleared {} cached entries of view {:?}", removed, self.prefix());
        Ok(removed)
    }
}

fn fresh<R, A: Accumulator>(def: &AggregationDef<R>) -> ViewResult<A> {
    downcast::<A>(def.init()).map_err(|_| ViewError::AccumulatorTypeMismatch {
        name: def.name().to_string(),
        declared: def.accumulator_name(),
        requested: std::any::type_name::<A>(),
    })
}
