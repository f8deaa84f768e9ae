//! Fill jobs: one chunk scanned into fresh accumulators

use crate::accumulator::ErasedAccumulator;
use crate::error::ChunkFailure;
use crate::registry::AggregationDef;
use crate::source::DataSource;
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::planning::Chunk;

/// Boxed job handed to a cluster session
pub type JobFn = Box<dyn FnOnce() -> Result<PartialResult, ChunkFailure> + Send + 'static>;

/// Records read from one input location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationStats {
    pub location: String,
    pub records: u64,
}

/// Accumulators built over a single chunk
pub struct PartialResult {
    pub chunk: usize,
    /// One accumulator per stale aggregation, in plan order
    pub accumulators: Vec<(String, Box<dyn ErasedAccumulator>)>,
    pub locations: Vec<LocationStats>,
}

impl PartialResult {
    pub fn records(&self) -> u64 {
        self.locations.iter().map(|l| l.records).sum()
    }
}

impl std::fmt::Debug for PartialResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.accumulators.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("PartialResult")
            .field("chunk", &self.chunk)
            .field("accumulators", &names)
            .field("locations", &self.locations)
            .finish()
    }
}

/// A chunk and the aggregations to fill from it
pub struct FillJob<R> {
    chunk: Chunk,
    defs: Arc<[Arc<AggregationDef<R>>]>,
    source: Arc<dyn DataSource<R>>,
}

impl<R: Send + Sync + 'static> FillJob<R> {
    pub fn new(
        chunk: Chunk,
        defs: Arc<[Arc<AggregationDef<R>>]>,
        source: Arc<dyn DataSource<R>>,
    ) -> Self {
        Self {
            chunk,
            defs,
            source,
        }
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    /// Scan every record of the chunk into fresh accumulators
    pub fn run(self) -> Result<PartialResult, ChunkFailure> {
        let chunk = &self.chunk;
        let fail = |location: &str, source: anyhow::Error| {
            ChunkFailure::new(chunk.index, chunk.locations.clone(), source).at_location(location)
        };

        let mut accumulators: Vec<Box<dyn ErasedAccumulator>> =
            self.defs.iter().map(|def| def.init()).collect();
        let mut locations = Vec::with_capacity(chunk.len());

        for location in &chunk.locations {
            let records = self
                .source
                .records(location)
                .map_err(|e| fail(location, e))?;

            let mut count = 0u64;
            for record in records {
                let record = record.map_err(|e| fail(location, e))?;
                for (def, acc) in self.defs.iter().zip(accumulators.iter_mut()) {
                    def.fill(&record, acc.as_mut())
                        .with_context(|| format!("filling {} from record {}", def.name(), count))
                        .map_err(|e| fail(location, e))?;
                }
                count += 1;
            }
            locations.push(LocationStats {
                location: location.clone(),
                records: count,
            });
        }

        Ok(PartialResult {
            chunk: chunk.index,
            accumulators: self
                .defs
                .iter()
                .map(|def| def.name().to_string())
                .zip(accumulators)
                .collect(),
            locations,
        })
    }

    /// Like [`FillJob::run`], but a panicking fill function becomes a
    /// chunk failure instead of unwinding into the caller
    pub fn run_catching(self) -> Result<PartialResult, ChunkFailure> {
        let index = self.chunk.index;
        let locations = self.chunk.locations.clone();
        match catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(result) => result,
            Err(panic) => Err(ChunkFailure::new(
                index,
                locations,
                anyhow!("fill job panicked: {}", panic_message(panic.as_ref())),
            )),
        }
    }

    pub fn into_job_fn(self) -> JobFn {
        Box::new(move || self.run_catching())
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{downcast, Counter, Sum};
    use crate::registry::Registry;
    use crate::testing::MemorySource;

    fn defs() -> Arc<[Arc<AggregationDef<f64>>]> {
        let mut registry = Registry::new();
        registry
            .declare("count", Counter::default, |_: &f64, c: &mut Counter| {
                c.increment();
                Ok(())
            })
            .unwrap();
        registry
            .declare("sum", Sum::default, |x: &f64, s: &mut Sum| {
                if x.is_nan() {
                    anyhow::bail!("NaN value");
                }
                s.add(*x);
                Ok(())
            })
            .unwrap();
        registry.iter().cloned().collect()
    }

    fn chunk(index: usize, locations: &[&str]) -> Chunk {
        Chunk {
            index,
            first: index,
            locations: locations.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_run_fills_every_record() {
        let source = MemorySource::new()
            .with_file("a", vec![1.0, 2.0])
            .with_file("b", vec![3.5]);
        let job = FillJob::new(chunk(0, &["a", "b"]), defs(), Arc::new(source));

        let partial = job.run().unwrap();
        assert_eq!(partial.records(), 3);
        assert_eq!(partial.locations[0].records, 2);

        let mut accs = partial.accumulators.into_iter();
        let (name, count) = accs.next().unwrap();
        assert_eq!(name, "count");
        assert_eq!(downcast::<Counter>(count).unwrap().count, 3);
        let (_, sum) = accs.next().unwrap();
        assert_eq!(downcast::<Sum>(sum).unwrap().total, 6.5);
    }

    #[test]
    fn test_fill_error_names_chunk_and_location() {
        let source = MemorySource::new()
            .with_file("a", vec![1.0])
            .with_file("b", vec![f64::NAN]);
        let job = FillJob::new(chunk(4, &["a", "b"]), defs(), Arc::new(source));

        let failure = job.run().unwrap_err();
        assert_eq!(failure.chunk, 4);
        assert_eq!(failure.location.as_deref(), Some("b"));
        assert!(format!("{:#}", failure.source).contains("NaN value"));
    }

    #[test]
    fn test_missing_location_fails() {
        let source = MemorySource::new().with_file("a", vec![1.0]);
        let job = FillJob::new(chunk(0, &["missing"]), defs(), Arc::new(source));
        assert!(job.run().is_err());
    }

    #[test]
    fn test_panic_becomes_chunk_failure() {
        let mut registry: Registry<f64> = Registry::new();
        registry
            .declare("boom", Counter::default, |_: &f64, _: &mut Counter| {
                panic!("fill exploded")
            })
            .unwrap();
        let defs: Arc<[_]> = registry.iter().cloned().collect();
        let source = MemorySource::new().with_file("a", vec![1.0]);

        let job = FillJob::new(chunk(1, &["a"]), defs, Arc::new(source));
        let failure = (job.into_job_fn())().unwrap_err();
        assert_eq!(failure.chunk, 1);
        assert!(failure.source.to_string().contains("fill exploded"));
    }
}
