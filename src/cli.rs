//! Command-line interface of the `histoview` binary
//!
//! The binary declares built-in aggregations over JSON-lines files from its
//! flags, so a view can be filled and inspected without writing Rust.

use crate::accumulator::{Counter, Histogram1D, Sum};
use crate::cache::CacheStore;
use crate::config::ViewConfig;
use crate::error::ViewResult;
use crate::fill::FillReport;
use crate::source::{DataSource, InputFingerprint, JsonLinesSource};
use crate::storage::{BackendType, StorageFactory};
use crate::view::View;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cached, incrementally filled aggregations over record files
#[derive(Debug, Parser)]
#[command(name = "histoview", version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Declare aggregations over JSON-lines files and fill the stale ones
    Fill(FillArgs),
    /// List entries cached for a view
    List {
        #[command(flatten)]
        target: ViewTarget,
        /// Only entries valid for FILES
        #[arg(long, requires = "files")]
        cached: bool,
        /// Input files to check entries against
        files: Vec<PathBuf>,
    },
    /// Print the stored state of one entry
    Show {
        #[command(flatten)]
        target: ViewTarget,
        /// Aggregation name
        entry: String,
    },
    /// Remove every cached entry of a view
    Clear {
        #[command(flatten)]
        target: ViewTarget,
    },
}

/// Which view of which store a command works on
#[derive(Debug, Clone, Args)]
pub struct ViewTarget {
    /// Store directory (overrides the configured one)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// View name, used as the key prefix inside the store
    #[arg(long)]
    pub view: String,
}

#[derive(Debug, Clone, Args)]
pub struct FillArgs {
    #[command(flatten)]
    pub target: ViewTarget,

    /// Input files per fill job
    #[arg(long)]
    pub chunksize: Option<usize>,

    /// Fill on a local worker pool of this size
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Count records: NAME
    #[arg(long = "count", value_name = "NAME", value_parser = parse_count)]
    pub counts: Vec<AggregationSpec>,

    /// Sum a numeric field: NAME=FIELD
    #[arg(long = "sum", value_name = "NAME=FIELD", value_parser = parse_sum)]
    pub sums: Vec<AggregationSpec>,

    /// Histogram of a numeric field: NAME=FIELD:BINS:LOW:HIGH
    #[arg(long = "hist", value_name = "NAME=FIELD:BINS:LOW:HIGH", value_parser = parse_hist)]
    pub hists: Vec<AggregationSpec>,

    /// JSON-lines input files, in scan order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl FillArgs {
    /// Aggregations in declaration order: counts, then sums, then histograms
    pub fn aggregations(&self) -> impl Iterator<Item = &AggregationSpec> {
        self.counts.iter().chain(&self.sums).chain(&self.hists)
    }
}

/// A built-in aggregation requested on the command line
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationSpec {
    Count {
        name: String,
    },
    Sum {
        name: String,
        field: String,
    },
    Hist {
        name: String,
        field: String,
        bins: usize,
        low: f64,
        high: f64,
    },
}

impl AggregationSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Count { name } | Self::Sum { name, .. } | Self::Hist { name, .. } => name,
        }
    }

    pub fn declare(&self, view: &mut View<Value>) -> ViewResult<usize> {
        match self.clone() {
            Self::Count { name } => {
                view.declare(&name, Counter::default, |_: &Value, c: &mut Counter| {
                    c.increment();
                    Ok(())
                })
            }
            Self::Sum { name, field } => {
                view.declare(&name, Sum::default, move |record: &Value, s: &mut Sum| {
                    s.add(numeric_field(record, &field)?);
                    Ok(())
                })
            }
            Self::Hist {
                name,
                field,
                bins,
                low,
                high,
            } => {
                let title = format!("{name}: {field}");
                view.declare(
                    &name,
                    move || Histogram1D::new(title.clone(), bins, low, high),
                    move |record: &Value, h: &mut Histogram1D| {
                        h.fill(numeric_field(record, &field)?);
                        Ok(())
                    },
                )
            }
        }
    }
}

fn numeric_field(record: &Value, field: &str) -> Result<f64> {
    record
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("record has no numeric field {field:?}"))
}

fn parse_count(s: &str) -> std::result::Result<AggregationSpec, String> {
    Ok(AggregationSpec::Count {
        name: s.to_string(),
    })
}

fn parse_sum(s: &str) -> std::result::Result<AggregationSpec, String> {
    let (name, field) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=FIELD, got {s:?}"))?;
    if field.is_empty() {
        return Err(format!("missing field in {s:?}"));
    }
    Ok(AggregationSpec::Sum {
        name: name.to_string(),
        field: field.to_string(),
    })
}

fn parse_hist(s: &str) -> std::result::Result<AggregationSpec, String> {
    let usage = || format!("expected NAME=FIELD:BINS:LOW:HIGH, got {s:?}");
    let (name, rest) = s.split_once('=').ok_or_else(usage)?;
    let parts: Vec<&str> = rest.split(':').collect();
    let [field, bins, low, high] = parts[..] else {
        return Err(usage());
    };

    let bins: usize = bins.parse().map_err(|_| usage())?;
    let low: f64 = low.parse().map_err(|_| usage())?;
    let high: f64 = high.parse().map_err(|_| usage())?;
    if bins == 0 || !low.is_finite() || !high.is_finite() || low >= high {
        return Err(format!("{s:?}: need BINS > 0 and finite LOW < HIGH"));
    }
    Ok(AggregationSpec::Hist {
        name: name.to_string(),
        field: field.to_string(),
        bins,
        low,
        high,
    })
}

/// Configuration from `--config`, or from the environment
pub async fn resolve_config(path: Option<&Path>, target: &ViewTarget) -> Result<ViewConfig> {
    let mut config = match path {
        Some(path) => ViewConfig::load(path).await?,
        None => ViewConfig::from_env()?,
    };
    if let Some(store) = &target.store {
        config.store.backend = BackendType::File;
        config.store.base_dir = store.clone();
    }
    Ok(config)
}

async fn open_cache(config: &ViewConfig, target: &ViewTarget) -> Result<CacheStore> {
    let container = StorageFactory::from_config(&config.store)
        .await
        .with_context(|| format!("opening store {}", config.store.base_dir.display()))?;
    Ok(CacheStore::new(container, &target.view)?.with_lock_timeout(config.lock_timeout))
}

pub async fn run_fill(mut config: ViewConfig, args: &FillArgs) -> Result<FillReport> {
    if let Some(chunksize) = args.chunksize {
        config.chunksize = chunksize;
    }
    if let Some(workers) = args.workers {
        config.max_parallel = workers;
    }

    let container = StorageFactory::from_config(&config.store)
        .await
        .with_context(|| format!("opening store {}", config.store.base_dir.display()))?;
    let source = JsonLinesSource::from_files(args.files.iter().cloned());
    let mut view = View::<Value>::new(Arc::new(source), &container, &args.target.view)?
        .with_config(config)?;

    for agg in args.aggregations() {
        agg.declare(&mut view)?;
    }
    if view.list(false).await?.is_empty() {
        bail!("nothing to fill: declare aggregations with --count, --sum or --hist");
    }
    if args.workers.is_some_and(|n| n > 1) {
        view.enable_local_cluster();
    }

    Ok(view.fill_with_report().await?)
}

/// One row of `histoview list`
#[derive(Debug, Clone, PartialEq)]
pub struct ListedEntry {
    pub name: String,
    pub accumulator: String,
    pub entries: Option<u64>,
    /// Whether the entry matches the given input files, if any were given
    pub valid: Option<bool>,
}

impl std::fmt::Display for ListedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short_type = self.accumulator.rsplit("::").next().unwrap_or_default();
        let entries = self
            .entries
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        write!(f, "{}\t{}\t{}", self.name, short_type, entries)?;
        match self.valid {
            Some(true) => write!(f, "\tvalid"),
            Some(false) => write!(f, "\tstale"),
            None => Ok(()),
        }
    }
}

pub async fn run_list(
    config: &ViewConfig,
    target: &ViewTarget,
    cached: bool,
    files: &[PathBuf],
) -> Result<Vec<ListedEntry>> {
    let cache = open_cache(config, target).await?;
    let current = if files.is_empty() {
        None
    } else {
        let source = JsonLinesSource::from_files(files.iter().cloned());
        Some(InputFingerprint::of(&source.locations()?))
    };

    let listed = cache
        .summaries()
        .await?
        .into_iter()
        .map(|summary| ListedEntry {
            valid: current.as_ref().map(|fp| &summary.fingerprint == fp),
            name: summary.name,
            accumulator: summary.accumulator,
            entries: summary.entries,
        })
        .filter(|entry| !cached || entry.valid == Some(true))
        .collect();
    Ok(listed)
}

/// Stored state of `entry`, pretty-printed
pub async fn run_show(config: &ViewConfig, target: &ViewTarget, entry: &str) -> Result<String> {
    let cache = open_cache(config, target).await?;
    let stored = cache
        .entry(entry)
        .await?
        .ok_or_else(|| anyhow!("no cached entry {entry:?} in view {:?}", target.view))?;
    let state: Value = serde_json::from_str(&stored.state)?;
    Ok(serde_json::to_string_pretty(&state)?)
}

pub async fn run_clear(config: &ViewConfig, target: &ViewTarget) -> Result<usize> {
    let cache = open_cache(config, target).await?;
    Ok(cache.clear().await?)
}
