//! Input data sources and input fingerprints
//!
//! A data source is an ordered list of input locations (paths or URLs) plus a
//! way to iterate the records stored at each location. Record internals are
//! never inspected here; records are only handed to user fill functions.

mod jsonl;

pub use jsonl::JsonLinesSource;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Fallible iterator over the records of one input location
pub type RecordIter<'a, R> = Box<dyn Iterator<Item = anyhow::Result<R>> + Send + 'a>;

/// Ordered, finite collection of record files
pub trait DataSource<R>: Send + Sync + 'static {
    /// Input locations in scan order
    fn locations(&self) -> anyhow::Result<Vec<String>>;

    /// Open one location for reading
    fn records<'a>(&'a self, location: &str) -> anyhow::Result<RecordIter<'a, R>>;

    /// Fingerprint of the current input list
    ///
    /// Overrides must agree with `InputFingerprint::of(&self.locations()?)`.
    fn fingerprint(&self) -> anyhow::Result<InputFingerprint> {
        Ok(InputFingerprint::of(&self.locations()?))
    }
}

/// Identifies the exact, ordered input list an accumulator was built from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputFingerprint(String);

impl InputFingerprint {
    pub fn of<S: AsRef<str>>(locations: &[S]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((locations.len() as u64).to_le_bytes());
        for location in locations {
            let location = location.as_ref();
            hasher.update((location.len() as u64).to_le_bytes());
            hasher.update(location.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InputFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough to tell inputs apart in logs
        let short: String = self.0.chars().take(12).collect();
        f.write_str(&short)
    }
}
