//! Error types for declaring, filling and reading cached aggregations
//!
//! `ViewError` is the single error surfaced by [`crate::View`]. Storage-layer
//! failures keep their own [`StorageError`] type and are wrapped here.

use crate::accumulator::MergeError;
use crate::source::InputFingerprint;
use crate::storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Result type for view operations
pub type ViewResult<T> = Result<T, ViewError>;

/// Main error type for registry, cache and fill operations
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("aggregation {name} is already declared in this view")]
    NameConflict { name: String },

    #[error("aggregation {name} is not declared in this view")]
    UnknownAggregation { name: String },

    #[error("invalid aggregation name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("aggregation {name} accumulates {declared}, not {requested}")]
    AccumulatorTypeMismatch {
        name: String,
        declared: &'static str,
        requested: &'static str,
    },

    #[error("Fill job failed: {0}")]
    ChunkFailure(Box<ChunkFailure>),

    #[error("failed to merge chunk {chunk} into {name}")]
    MergeFailure {
        name: String,
        chunk: usize,
        #[source]
        source: MergeError,
    },

    #[error("failed to commit {name} to the cache store")]
    StoreWriteFailure {
        name: String,
        #[source]
        source: StorageError,
    },

    #[error("input changed during fill: planned against {planned}, source now reports {current}")]
    StaleFingerprintMismatch {
        planned: InputFingerprint,
        current: InputFingerprint,
    },

    #[error("chunksize must be at least 1")]
    InvalidChunkSize,

    #[error("data source error: {0}")]
    Source(#[source] anyhow::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ViewError {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownAggregation { name: name.into() }
    }

    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Whether rerunning the whole fill cycle may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ChunkFailure(_)
            | Self::StaleFingerprintMismatch { .. }
            | Self::StoreWriteFailure { .. } => true,
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The failed chunk, if this error came from a fill job
    pub fn chunk_failure(&self) -> Option<&ChunkFailure> {
        match self {
            Self::ChunkFailure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ChunkFailure> for ViewError {
    fn from(failure: ChunkFailure) -> Self {
        Self::ChunkFailure(Box::new(failure))
    }
}

/// A fill job that could not produce its partial result
#[derive(Debug)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub locations: Vec<String>,
    /// Location being read when the job failed, if it got that far
    pub location: Option<String>,
    pub source: anyhow::Error,
}

impl ChunkFailure {
    pub fn new(chunk: usize, locations: Vec<String>, source: anyhow::Error) -> Self {
        Self {
            chunk,
            locations,
            location: None,
            source,
        }
    }

    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {} ", self.chunk)?;
        match &self.location {
            Some(location) => write!(f, "at {}", location)?,
            None => write!(f, "over {:?}", self.locations)?,
        }
        write!(f, ": {:#}", self.source)
    }
}

impl std::error::Error for ChunkFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
