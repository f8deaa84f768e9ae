//! Pure chunk planning for fill cycles
//!
//! Splitting the input list has no I/O and is deterministic: the same
//! locations and chunksize always give the same chunks, which is what makes
//! chunk-index merge order reproducible.

use crate::error::{ViewError, ViewResult};
use std::fmt;

/// A contiguous run of input locations processed by one fill job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the plan, also its merge order
    pub index: usize,
    /// Index of the first location within the full input list
    pub first: usize,
    pub locations: Vec<String>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} (inputs {}..{})",
            self.index,
            self.first,
            self.first + self.locations.len()
        )
    }
}

/// Pure: split locations into chunks of `chunksize`, preserving order
///
/// Chunks are disjoint and cover every location exactly once; only the last
/// chunk may be shorter.
pub fn plan_chunks(locations: &[String], chunksize: usize) -> ViewResult<Vec<Chunk>> {
    if chunksize == 0 {
        return Err(ViewError::InvalidChunkSize);
    }

    Ok(locations
        .chunks(chunksize)
        .enumerate()
        .map(|(index, slice)| Chunk {
            index,
            first: index * chunksize,
            locations: slice.to_vec(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}.jsonl")).collect()
    }

    #[test]
    fn test_chunksize_one() {
        let chunks = plan_chunks(&files(3), 1).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].locations, vec!["f2.jsonl"]);
        assert_eq!(chunks[2].first, 2);
    }

    #[test]
    fn test_last_chunk_shorter() {
        let chunks = plan_chunks(&files(5), 2).unwrap();
        let sizes: Vec<_> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(chunks[2].to_string(), "chunk 2 (inputs 4..5)");
    }

    #[test]
    fn test_oversized_chunk_takes_everything() {
        let chunks = plan_chunks(&files(3), 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].locations, files(3));
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        assert!(plan_chunks(&[], 4).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunksize_rejected() {
        assert!(matches!(
            plan_chunks(&files(2), 0),
            Err(ViewError::InvalidChunkSize)
        ));
    }
}
