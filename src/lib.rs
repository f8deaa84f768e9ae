//! # Histoview
//!
//! Named aggregations ("histograms") over a chain of record files, filled in
//! one scan and cached so later reads skip the data entirely.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use histoview::accumulator::{Counter, Sum};
//! use histoview::source::JsonLinesSource;
//! use histoview::storage::Container;
//! use histoview::View;
//! use std::sync::Arc;
//!
//! let source = JsonLinesSource::from_glob("data/*.jsonl")?;
//! let mut view =
//!     View::<serde_json::Value>::new(Arc::new(source), &Container::in_memory(), "run_1")?;
//! view.declare("count", Counter::default, |_, c: &mut Counter| {
//!     c.increment();
//!     Ok(())
//! })?;
//! view.declare("sum_x", Sum::default, |record: &serde_json::Value, s: &mut Sum| {
//!     s.add(record["x"].as_f64().unwrap_or_default());
//!     Ok(())
//! })?;
//!
//! view.fill_all().await?;
//! let count = view.get::<Counter>("count").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - `accumulator` - Mergeable aggregation state and the built-in accumulators
//! - `registry` - Declared aggregations of a view
//! - `cache` - Fingerprinted cache entries under a view prefix
//! - `fill` - Stale detection, chunking, dispatch and ordered merge
//! - `cluster` - Submitting fill jobs to a worker pool
//! - `source` - Input data sources and input fingerprints
//! - `storage` - Blob stores, containers and per-key write locks
//! - `view` - The composition root tying one source to its aggregations
//! - `testing` - In-memory sources and fault-injecting collaborators
pub mod accumulator;
pub mod cache;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod fill;
pub mod registry;
pub mod source;
pub mod storage;
pub mod view;

pub mod testing;


pub use accumulator::{Accumulator, MergeError};
pub use cache::{CacheEntry, CacheLookup, EntrySummary};
pub use config::ViewConfig;
pub use error::{ChunkFailure, ViewError, ViewResult};
pub use fill::FillReport;
pub use source::{DataSource, InputFingerprint};
pub use view::{AggregationInfo, AggregationStatus, View};
