//! Accumulator contract for user-declared aggregations
//!
//! Any state that can be built per chunk and combined afterwards can be an
//! accumulator. The fill pipeline only relies on three things:
//!
//! - `merge` is associative and commutative over states built from disjoint
//!   data, so per-chunk partials combine into the same result as a single
//!   pass over all of the input.
//! - the state produced by the declared `init` function is an identity for
//!   `merge`.
//! - the state round-trips through its JSON serialization.

pub mod builtin;

pub use builtin::{Counter, Histogram1D, Sum};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use thiserror::Error;

/// Why two accumulator states could not be combined
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("cannot merge {left} with {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },

    #[error("incompatible accumulator states: {0}")]
    Incompatible(String),
}

/// Mergeable, serializable aggregation state
pub trait Accumulator: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Combine two states built over disjoint data
    fn merge(self, other: Self) -> Result<Self, MergeError>;

    /// Number of entries recorded, for listings
    fn entries(&self) -> Option<u64> {
        None
    }
}

/// Object-safe view of an [`Accumulator`]
///
/// Partial results and registry definitions hold accumulators of many
/// concrete types side by side, so they go through this trait.
pub trait ErasedAccumulator: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    fn merge_boxed(
        self: Box<Self>,
        other: Box<dyn ErasedAccumulator>,
    ) -> Result<Box<dyn ErasedAccumulator>, MergeError>;

    fn to_json(&self) -> serde_json::Result<String>;

    fn entries(&self) -> Option<u64>;
}

impl<A: Accumulator> ErasedAccumulator for A {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<A>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn merge_boxed(
        self: Box<Self>,
        other: Box<dyn ErasedAccumulator>,
    ) -> Result<Box<dyn ErasedAccumulator>, MergeError> {
        let right = other.type_name();
        let other = other
            .into_any()
            .downcast::<A>()
            .map_err(|_| MergeError::TypeMismatch {
                left: std::any::type_name::<A>(),
                right,
            })?;
        let merged = (*self).merge(*other)?;
        Ok(Box::new(merged))
    }

    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn entries(&self) -> Option<u64> {
        Accumulator::entries(self)
    }
}

/// Recover the concrete accumulator from an erased box
pub fn downcast<A: Accumulator>(erased: Box<dyn ErasedAccumulator>) -> Result<A, MergeError> {
    let found = erased.type_name();
    erased
        .into_any()
        .downcast::<A>()
        .map(|boxed| *boxed)
        .map_err(|_| MergeError::TypeMismatch {
            left: std::any::type_name::<A>(),
            right: found,
        })
}
