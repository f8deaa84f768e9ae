//! Stock accumulators: record counter, numeric sum and fixed-bin histogram

use super::{Accumulator, MergeError};
use serde::{Deserialize, Serialize};

/// Number of records seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub count: u64,
}

impl Counter {
    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn add(&mut self, n: u64) {
        self.count = self.count.saturating_add(n);
    }
}

impl From<u64> for Counter {
    fn from(count: u64) -> Self {
        Self { count }
    }
}

impl Accumulator for Counter {
    fn merge(self, other: Self) -> Result<Self, MergeError> {
        Ok(Self {
            count: self.count.saturating_add(other.count),
        })
    }

    fn entries(&self) -> Option<u64> {
        Some(self.count)
    }
}

/// Running sum of a numeric field
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sum {
    pub total: f64,
    pub entries: u64,
}

impl Sum {
    pub fn add(&mut self, value: f64) {
        self.total += value;
        self.entries += 1;
    }

    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut sum = Self::default();
        for value in values {
            sum.add(value);
        }
        sum
    }

    pub fn mean(&self) -> Option<f64> {
        (self.entries > 0).then(|| self.total / self.entries as f64)
    }
}

impl Accumulator for Sum {
    fn merge(self, other: Self) -> Result<Self, MergeError> {
        Ok(Self {
            total: self.total + other.total,
            entries: self.entries + other.entries,
        })
    }

    fn entries(&self) -> Option<u64> {
        Some(self.entries)
    }
}

/// One-dimensional histogram with equal-width bins over `[low, high)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    pub title: String,
    pub low: f64,
    pub high: f64,
    pub bins: Vec<f64>,
    pub underflow: f64,
    pub overflow: f64,
    pub entries: u64,
}

impl Histogram1D {
    /// Empty histogram with `nbins` bins (at least one) over `[low, high)`
    ///
    /// Bounds are expected to be finite with `low < high`. Other bounds are
    /// stored as given; such a histogram still merges with histograms built
    /// from the same bounds, but its bin assignment is meaningless.
    pub fn new(title: impl Into<String>, nbins: usize, low: f64, high: f64) -> Self {
        Self {
            title: title.into(),
            low,
            high,
            bins: vec![0.0; nbins.max(1)],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        }
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        self.entries += 1;
        if x.is_nan() || x < self.low {
            self.underflow += weight;
        } else if x >= self.high {
            self.overflow += weight;
        } else {
            let width = (self.high - self.low) / self.bins.len() as f64;
            let idx = ((x - self.low) / width) as usize;
            // rounding can land exactly on the upper edge
            let idx = idx.min(self.bins.len() - 1);
            self.bins[idx] += weight;
        }
    }

    /// Sum of in-range bin contents
    pub fn integral(&self) -> f64 {
        self.bins.iter().sum()
    }

    pub fn bin_content(&self, idx: usize) -> Option<f64> {
        self.bins.get(idx).copied()
    }

    fn same_binning(&self, other: &Self) -> bool {
        self.bins.len() == other.bins.len()
            && same_bound(self.low, other.low)
            && same_bound(self.high, other.high)
    }
}

fn same_bound(a: f64, b: f64) -> bool {
    a == b || a.to_bits() == b.to_bits()
}

impl Accumulator for Histogram1D {
    fn merge(mut self, other: Self) -> Result<Self, MergeError> {
        if !self.same_binning(&other) {
            return Err(MergeError::Incompatible(format!(
                "histogram {} has {} bins over [{}, {}), other has {} bins over [{}, {})",
                self.title,
                self.bins.len(),
                self.low,
                self.high,
                other.bins.len(),
                other.low,
                other.high
            )));
        }

        for (bin, add) in self.bins.iter_mut().zip(other.bins) {
            *bin += add;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        Ok(self)
    }

    fn entries(&self) -> Option<u64> {
        Some(self.entries)
    }
}
