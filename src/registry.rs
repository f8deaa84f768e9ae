//! Declared aggregations and their accumulator factories
//!
//! The registry is pure bookkeeping. Definitions are immutable once declared
//! and only ever added to; filling happens in [`crate::fill`].

use crate::accumulator::{Accumulator, ErasedAccumulator};
use crate::error::{ViewError, ViewResult};
use anyhow::anyhow;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

type InitFn = dyn Fn() -> Box<dyn ErasedAccumulator> + Send + Sync;
type FillFn<R> = dyn Fn(&R, &mut dyn ErasedAccumulator) -> anyhow::Result<()> + Send + Sync;
type DecodeFn = dyn Fn(&str) -> serde_json::Result<()> + Send + Sync;

/// A named aggregation: how to create an empty accumulator and how to fill
/// it from one record
pub struct AggregationDef<R> {
    name: String,
    accumulator_type: TypeId,
    accumulator_name: &'static str,
    init: Box<InitFn>,
    fill: Box<FillFn<R>>,
    decode: Box<DecodeFn>,
}

impl<R: 'static> AggregationDef<R> {
    pub fn new<A, I, F>(name: impl Into<String>, init: I, fill: F) -> Self
    where
        A: Accumulator,
        I: Fn() -> A + Send + Sync + 'static,
        F: Fn(&R, &mut A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let fill_name = name.clone();
        Self {
            name,
            accumulator_type: TypeId::of::<A>(),
            accumulator_name: std::any::type_name::<A>(),
            init: Box::new(move || -> Box<dyn ErasedAccumulator> { Box::new(init()) }),
            fill: Box::new(move |record: &R, acc: &mut dyn ErasedAccumulator| {
                let acc = acc.as_any_mut().downcast_mut::<A>().ok_or_else(|| {
                    anyhow!(
                        "accumulator for {} is not a {}",
                        fill_name,
                        std::any::type_name::<A>()
                    )
                })?;
                fill(record, acc)
            }),
            decode: Box::new(|state: &str| serde_json::from_str::<A>(state).map(|_| ())),
        }
    }
}

impl<R> AggregationDef<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accumulator_name(&self) -> &'static str {
        self.accumulator_name
    }

    pub fn holds<A: Accumulator>(&self) -> bool {
        self.accumulator_type == TypeId::of::<A>()
    }

    /// Fresh, empty accumulator
    pub fn init(&self) -> Box<dyn ErasedAccumulator> {
        (self.init)()
    }

    pub fn fill(&self, record: &R, acc: &mut dyn ErasedAccumulator) -> anyhow::Result<()> {
        (self.fill)(record, acc)
    }

    /// Check that a serialized state parses as this definition's accumulator
    pub fn check_state(&self, state: &str) -> serde_json::Result<()> {
        (self.decode)(state)
    }

    /// Fail unless this definition accumulates into `A`
    pub fn expect_type<A: Accumulator>(&self) -> ViewResult<()> {
        if self.holds::<A>() {
            Ok(())
        } else {
            Err(ViewError::AccumulatorTypeMismatch {
                name: self.name.clone(),
                declared: self.accumulator_name,
                requested: std::any::type_name::<A>(),
            })
        }
    }
}

impl<R> fmt::Debug for AggregationDef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationDef")
            .field("name", &self.name)
            .field("accumulator", &self.accumulator_name)
            .finish()
    }
}

/// Declared aggregations of one view, in declaration order
pub struct Registry<R> {
    defs: Vec<Arc<AggregationDef<R>>>,
}

impl<R> Default for Registry<R> {
    fn default() -> Self {
        Self { defs: Vec::new() }
    }
}

impl<R: 'static> Registry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new aggregation, returning how many are now declared
    pub fn declare<A, I, F>(&mut self, name: &str, init: I, fill: F) -> ViewResult<usize>
    where
        A: Accumulator,
        I: Fn() -> A + Send + Sync + 'static,
        F: Fn(&R, &mut A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert(AggregationDef::new(name, init, fill))
    }

    pub fn insert(&mut self, def: AggregationDef<R>) -> ViewResult<usize> {
        validate_name(def.name())?;
        if self.contains(def.name()) {
            return Err(ViewError::NameConflict {
                name: def.name().to_string(),
            });
        }
        self.defs.push(Arc::new(def));
        Ok(self.defs.len())
    }
}

impl<R> Registry<R> {
    pub fn get(&self, name: &str) -> Option<&Arc<AggregationDef<R>>> {
        self.defs.iter().find(|def| def.name() == name)
    }

    pub fn require(&self, name: &str) -> ViewResult<&Arc<AggregationDef<R>>> {
        self.get(name).ok_or_else(|| ViewError::unknown(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.defs.iter().map(|def| def.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AggregationDef<R>>> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Names become store keys, so they must be a single path segment
pub fn validate_name(name: &str) -> ViewResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.starts_with('.') {
        Some("name starts with '.'")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name contains a path separator or NUL")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ViewError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
