//! Cache of merged accumulators, keyed by aggregation name
//!
//! Every entry records the fingerprint of the input list it was built from.
//! An entry is only valid while that fingerprint matches the view's current
//! input; anything else (missing, unreadable, built from other inputs) is
//! stale and gets refilled.

use crate::accumulator::{Accumulator, ErasedAccumulator};
use crate::error::{ViewError, ViewResult};
use crate::registry::AggregationDef;
use crate::source::InputFingerprint;
use crate::storage::{join_key, validate_key, Container, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Persisted, merged state of one aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub name: String,
    pub fingerprint: InputFingerprint,
    /// Rust type name of the accumulator
    pub accumulator: String,
    pub entries: Option<u64>,
    pub committed_at: DateTime<Utc>,
    /// Accumulator serialized as JSON text
    pub state: String,
}

impl CacheEntry {
    /// Built from `fingerprint` into an accumulator of type `accumulator`
    pub fn is_valid_for(&self, fingerprint: &InputFingerprint, accumulator: &str) -> bool {
        &self.fingerprint == fingerprint && self.accumulator == accumulator
    }

    pub fn decode<A: Accumulator>(&self) -> StorageResult<A> {
        serde_json::from_str(&self.state).map_err(StorageError::serialization)
    }
}

/// What the cache holds for one declared aggregation
#[derive(Debug, Clone, PartialEq)]
pub enum EntryState {
    Valid(CacheEntry),
    /// Present but built from other inputs, of another type, or unreadable
    Stale,
    Missing,
}

/// Result of reading an aggregation from the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<A> {
    /// Merged state from a valid entry
    Filled(A),
    /// Fresh `init()` state; the aggregation has not been filled for the
    /// current input
    Empty(A),
}

impl<A> CacheLookup<A> {
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled(_))
    }

    pub fn get(&self) -> &A {
        match self {
            Self::Filled(a) | Self::Empty(a) => a,
        }
    }

    pub fn into_inner(self) -> A {
        match self {
            Self::Filled(a) | Self::Empty(a) => a,
        }
    }

    /// The filled state, `None` if not yet filled
    pub fn filled(self) -> Option<A> {
        match self {
            Self::Filled(a) => Some(a),
            Self::Empty(_) => None,
        }
    }
}

/// One row of the cached-entry listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub name: String,
    pub accumulator: String,
    pub entries: Option<u64>,
    pub committed_at: DateTime<Utc>,
    pub fingerprint: InputFingerprint,
}

impl From<&CacheEntry> for EntrySummary {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            name: entry.name.clone(),
            accumulator: entry.accumulator.clone(),
            entries: entry.entries,
            committed_at: entry.committed_at,
            fingerprint: entry.fingerprint.clone(),
        }
    }
}

/// Cache entries of one view: a prefix inside a shared container
pub struct CacheStore {
    container: Arc<Container>,
    prefix: String,
    lock_timeout: Duration,
}

impl CacheStore {
    pub fn new(container: Arc<Container>, prefix: &str) -> StorageResult<Self> {
        let prefix = prefix.trim_matches('/').to_string();
        if !prefix.is_empty() {
            validate_key(&prefix)?;
        }
        Ok(Self {
            container,
            prefix,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    fn key(&self, name: &str) -> String {
        join_key(&self.prefix, name)
    }

    /// Read and parse the entry stored for name
    pub async fn entry(&self, name: &str) -> StorageResult<Option<CacheEntry>> {
        let key = self.key(name);
        match self.container.backend().read(&key).await? {
            Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
            None => Ok(None),
        }
    }

    /// Classify the entry stored for `def` against the current input
    ///
    /// An entry is valid only if it was built from `current`, holds the
    /// accumulator type `def` declares, and its state parses as that type.
    /// Anything else is stale so the next fill replaces it.
    pub async fn lookup<R>(
        &self,
        def: &AggregationDef<R>,
        current: &InputFingerprint,
    ) -> StorageResult<EntryState> {
        let key = self.key(def.name());
        let entry = match self.entry(def.name()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(EntryState::Missing),
            Err(StorageError::Serialization(e)) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, e);
                return Ok(EntryState::Stale);
            }
            Err(e) => return Err(e),
        };

        if !entry.is_valid_for(current, def.accumulator_name()) {
            if entry.accumulator != def.accumulator_name() {
                debug!(
                    "Cache entry {} holds {}, declared as {}",
                    key,
                    entry.accumulator,
                    def.accumulator_name()
                );
            }
            return Ok(EntryState::Stale);
        }
        if let Err(e) = def.check_state(&entry.state) {
            warn!("Cached state of {} does not decode as {}: {}", key, def.accumulator_name(), e);
            return Ok(EntryState::Stale);
        }
        Ok(EntryState::Valid(entry))
    }

    /// The entry for `def` if it is valid for `current`
    pub async fn valid_entry<R>(
        &self,
        def: &AggregationDef<R>,
        current: &InputFingerprint,
    ) -> StorageResult<Option<CacheEntry>> {
        match self.lookup(def, current).await? {
            EntryState::Valid(entry) => Ok(Some(entry)),
            EntryState::Stale | EntryState::Missing => Ok(None),
        }
    }

    pub async fn is_stale<R>(
        &self,
        def: &AggregationDef<R>,
        current: &InputFingerprint,
    ) -> StorageResult<bool> {
        Ok(self.valid_entry(def, current).await?.is_none())
    }

    /// Atomically replace the entry for name with `acc`
    ///
    /// Holds the key's write lock from serialization to the final write. If
    /// the write fails, the previous entry (if any) is written back.
    pub async fn commit(
        &self,
        name: &str,
        acc: &dyn ErasedAccumulator,
        fingerprint: &InputFingerprint,
    ) -> ViewResult<CacheEntry> {
        let failure = |source: StorageError| ViewError::StoreWriteFailure {
            name: name.to_string(),
            source,
        };
        let key = self.key(name);

        let state = acc
            .to_json()
            .map_err(|e| failure(StorageError::serialization(e)))?;
        let entry = CacheEntry {
            name: name.to_string(),
            fingerprint: fingerprint.clone(),
            accumulator: acc.type_name().to_string(),
            entries: acc.entries(),
            committed_at: Utc::now(),
            state,
        };
        let blob = serde_json::to_vec_pretty(&entry).map_err(|e| failure(e.into()))?;

        let guard = self
            .container
            .lock(&key, self.lock_timeout)
            .await
            .map_err(failure)?;
        let backend = self.container.backend();
        let prior = backend.read(&key).await.map_err(failure)?;

        if let Err(e) = backend.write(&key, &blob).await {
            if let Some(prior) = prior {
                match backend.write(&key, &prior).await {
                    Ok(()) => warn!("Commit of {} failed, restored previous entry: {}", key, e),
                    Err(restore) => error!(
                        "Commit of {} failed ({}) and previous entry could not be restored: {}",
                        key, e, restore
                    ),
                }
            }
            return Err(failure(e));
        }

        debug!(
            "Committed {} ({} entries) for input {} in {:.2?}",
            key,
            entry.entries.map_or_else(|| "?".to_string(), |n| n.to_string()),
            fingerprint,
            guard.held_for()
        );
        Ok(entry)
    }

    /// Entries present under this prefix, whatever their fingerprint
    pub async fn summaries(&self) -> StorageResult<Vec<EntrySummary>> {
        let mut summaries = Vec::new();
        for name in self.container.backend().list(&self.prefix).await? {
            match self.entry(&name).await {
                Ok(Some(entry)) => summaries.push(EntrySummary::from(&entry)),
                Ok(None) => {}
                Err(StorageError::Serialization(e)) => {
                    warn!("Skipping unreadable cache entry {}: {}", self.key(&name), e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summaries)
    }

    pub async fn remove(&self, name: &str) -> StorageResult<bool> {
        let key = self.key(name);
        let _guard = self.container.lock(&key, self.lock_timeout).await?;
        self.container.backend().remove(&key).await
    }

    /// Remove every entry under this prefix, returning how many were removed
    pub async fn clear(&self) -> StorageResult<usize> {
        let mut removed = 0;
        for name in self.container.backend().list(&self.prefix).await? {
            if self.remove(&name).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
