//! Deterministic merging of per-chunk partial results
//!
//! Partials may arrive in any order, but they are folded strictly in chunk
//! index order. An early arrival waits in a pending buffer until every chunk
//! before it has been folded. Because of this, sequential and distributed
//! fills produce byte-identical states even for accumulators such as
//! floating-point sums, whose merge is associative only up to rounding.

use crate::accumulator::ErasedAccumulator;
use crate::error::{ChunkFailure, ViewError, ViewResult};
use crate::registry::AggregationDef;
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use super::job::{LocationStats, PartialResult};

/// Running totals of one fill cycle
pub struct OrderedMerger {
    names: Vec<String>,
    running: Vec<Option<Box<dyn ErasedAccumulator>>>,
    pending: BTreeMap<usize, PartialResult>,
    next: usize,
    total: usize,
    locations: Vec<LocationStats>,
}

impl OrderedMerger {
    /// Start every running total from its identity `init()` state
    pub fn new<R>(defs: &[Arc<AggregationDef<R>>], total_chunks: usize) -> Self {
        Self {
            names: defs.iter().map(|def| def.name().to_string()).collect(),
            running: defs.iter().map(|def| Some(def.init())).collect(),
            pending: BTreeMap::new(),
            next: 0,
            total: total_chunks,
            locations: Vec::new(),
        }
    }

    /// Take one partial result; fold it and any buffered successors that
    /// are now in order. Returns how many chunks were folded.
    pub fn accept(&mut self, partial: PartialResult) -> ViewResult<usize> {
        let chunk = partial.chunk;
        if chunk >= self.total || chunk < self.next || self.pending.contains_key(&chunk) {
            return Err(ChunkFailure::new(
                chunk,
                vec![],
                anyhow!("unexpected or duplicate result for chunk {}", chunk),
            )
            .into());
        }
        self.pending.insert(chunk, partial);

        let mut folded = 0;
        while let Some(partial) = self.pending.remove(&self.next) {
            self.fold(partial)?;
            self.next += 1;
            folded += 1;
        }
        trace!(
            "Chunk {} arrived, folded {}, {} waiting",
            chunk,
            folded,
            self.pending.len()
        );
        Ok(folded)
    }

    fn fold(&mut self, partial: PartialResult) -> ViewResult<()> {
        if partial.accumulators.len() != self.names.len() {
            return Err(ChunkFailure::new(
                partial.chunk,
                vec![],
                anyhow!(
                    "expected {} accumulators, got {}",
                    self.names.len(),
                    partial.accumulators.len()
                ),
            )
            .into());
        }

        for (slot, (name, acc)) in partial.accumulators.into_iter().enumerate() {
            if name != self.names[slot] {
                return Err(ChunkFailure::new(
                    partial.chunk,
                    vec![],
                    anyhow!("expected accumulator {}, got {}", self.names[slot], name),
                )
                .into());
            }
            let current = self.running[slot]
                .take()
                .ok_or_else(|| ViewError::unknown(name.clone()))?;
            let merged = current
                .merge_boxed(acc)
                .map_err(|source| ViewError::MergeFailure {
                    name,
                    chunk: partial.chunk,
                    source,
                })?;
            self.running[slot] = Some(merged);
        }
        self.locations.extend(partial.locations);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.next == self.total
    }

    /// Number of partials waiting on an earlier chunk
    pub fn waiting(&self) -> usize {
        self.pending.len()
    }

    /// Final merged accumulators, in plan order, and per-location stats
    pub fn finish(self) -> ViewResult<MergedResult> {
        if !self.is_complete() {
            return Err(ChunkFailure::new(
                self.next,
                vec![],
                anyhow!("no result received for chunk {}", self.next),
            )
            .into());
        }

        let mut accumulators = Vec::with_capacity(self.names.len());
        for (name, acc) in self.names.into_iter().zip(self.running) {
            let acc = acc.ok_or_else(|| ViewError::unknown(name.clone()))?;
            accumulators.push((name, acc));
        }
        Ok(MergedResult {
            accumulators,
            locations: self.locations,
        })
    }
}

/// Output of a complete merge
pub struct MergedResult {
    pub accumulators: Vec<(String, Box<dyn ErasedAccumulator>)>,
    pub locations: Vec<LocationStats>,
}
