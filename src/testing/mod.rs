//! Testing utilities
//!
//! In-memory data sources and fault-injecting collaborators used by the unit
//! and integration tests.

pub mod mocks;

pub use mocks::{FlakyStore, ReorderingCluster};

use crate::source::{DataSource, RecordIter};
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// Data source whose "files" are in-memory record vectors
///
/// Files can be added after construction so tests can change the input list
/// between fill cycles.
pub struct MemorySource<R> {
    files: RwLock<Vec<(String, Vec<R>)>>,
    failures: RwLock<HashMap<String, String>>,
    appends: Mutex<HashMap<String, (String, Vec<R>)>>,
}

impl<R> Default for MemorySource<R> {
    fn default() -> Self {
        Self {
            files: RwLock::new(Vec::new()),
            failures: RwLock::new(HashMap::new()),
            appends: Mutex::new(HashMap::new()),
        }
    }
}

impl<R: Clone + Send + Sync + 'static> MemorySource<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, location: &str, records: Vec<R>) -> Self {
        self.push_file(location, records);
        self
    }

    /// Reading `location` yields its records, then fails with `message`
    pub fn failing_at(self, location: &str, message: &str) -> Self {
        self.inject_failure(location, message);
        self
    }

    pub fn inject_failure(&self, location: &str, message: &str) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(location.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Opening `trigger` appends a new file to the input list
    pub fn appending_on_read(self, trigger: &str, location: &str, records: Vec<R>) -> Self {
        self.appends
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(trigger.to_string(), (location.to_string(), records));
        self
    }

    pub fn push_file(&self, location: &str, records: Vec<R>) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((location.to_string(), records));
    }

    pub fn remove_file(&self, location: &str) -> bool {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let before = files.len();
        files.retain(|(name, _)| name != location);
        files.len() != before
    }
}

impl<R: Clone + Send + Sync + 'static> DataSource<R> for MemorySource<R> {
    fn locations(&self) -> anyhow::Result<Vec<String>> {
        let files = self.files.read().map_err(|_| anyhow!("source lock poisoned"))?;
        Ok(files.iter().map(|(name, _)| name.clone()).collect())
    }

    fn records<'a>(&'a self, location: &str) -> anyhow::Result<RecordIter<'a, R>> {
        let appended = self
            .appends
            .lock()
            .map_err(|_| anyhow!("source lock poisoned"))?
            .remove(location);
        if let Some((name, records)) = appended {
            self.push_file(&name, records);
        }

        let records = self
            .files
            .read()
            .map_err(|_| anyhow!("source lock poisoned"))?
            .iter()
            .find(|(name, _)| name == location)
            .map(|(_, records)| records.clone())
            .ok_or_else(|| anyhow!("no such input: {}", location))?;
        let failure = self
            .failures
            .read()
            .map_err(|_| anyhow!("source lock poisoned"))?
            .get(location)
            .cloned();

        Ok(Box::new(
            records
                .into_iter()
                .map(Ok)
                .chain(failure.map(|message| Err(anyhow!(message)))),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_lists_in_insertion_order() {
        let source = MemorySource::new()
            .with_file("b", vec![1])
            .with_file("a", vec![2, 3]);
        assert_eq!(source.locations().unwrap(), vec!["b", "a"]);

        let records: Vec<i32> = source
            .records("a")
            .unwrap()
            .collect::<anyhow::Result<_>>()
            .unwrap();
        assert_eq!(records, vec![2, 3]);
        assert!(source.records("missing").is_err());
    }

    #[test]
    fn test_failure_after_records() {
        let source = MemorySource::new()
            .with_file("a", vec![1, 2])
            .failing_at("a", "disk error");
        let results: Vec<_> = source.records("a").unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
    }

    #[test]
    fn test_appending_on_read_changes_fingerprint() {
        let source = MemorySource::new()
            .with_file("a", vec![1])
            .appending_on_read("a", "late", vec![9]);
        let before = source.fingerprint().unwrap();

        let _ = source.records("a").unwrap();
        assert_eq!(source.locations().unwrap(), vec!["a", "late"]);
        assert_ne!(source.fingerprint().unwrap(), before);

        assert!(source.remove_file("late"));
        assert_eq!(source.fingerprint().unwrap(), before);
    }
}
