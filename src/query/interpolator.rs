//! Interpolators - sampling a candidate sequence at a query timestamp
//!
//! An interpolator is a stateless lookup strategy: given the merged candidates
//! of one dataset element and a timeline timestamp, it returns the value that
//! goes into the row. Strategies are looked up by name through an
//! [`InterpolatorRegistry`], so new ones can be added without touching the
//! dataset assembler.
//!
//! # Built-in Strategies
//!
//! - **closest**: nearest timestamp; equidistant ties go to the later candidate;
//!   outside the candidate range the nearest endpoint is held
//! - **before**: last candidate at or before `t`, `null` if none
//! - **after**: first candidate at or after `t`, `null` if none

use crate::query::error::{QueryError, QueryResult};
use crate::query::merge::CandidateSequence;
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

lazy_static! {
    /// Process-wide registry holding the built-in interpolators
    ///
    /// Read-only after initialization. Callers that need extra strategies build
    /// their own registry with [`InterpolatorRegistry::with_builtins`] and
    /// register on top of it.
    static ref GLOBAL_REGISTRY: Arc<InterpolatorRegistry> =
        Arc::new(InterpolatorRegistry::with_builtins());
}

// ============================================================================
// Interpolator Trait
// ============================================================================

/// Lookup strategy over a candidate sequence
pub trait Interpolator: Send + Sync {
    /// Registry key
    fn name(&self) -> &'static str;

    /// Value of the candidate sequence at timestamp `t`
    ///
    /// Fails with `EmptyCandidateSequence` when there is nothing to search.
    /// `field` is only used for error messages.
    fn lookup(&self, field: &str, candidates: &CandidateSequence, t: f64) -> QueryResult<Value>;
}

fn ensure_candidates(field: &str, candidates: &CandidateSequence) -> QueryResult<()> {
    if candidates.is_empty() {
        return Err(QueryError::empty_candidates(field));
    }
    Ok(())
}

/// Nearest-timestamp lookup with later-wins ties and flat extrapolation
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosestInterpolator;

impl Interpolator for ClosestInterpolator {
    fn name(&self) -> &'static str {
        "closest"
    }

    fn lookup(&self, field: &str, candidates: &CandidateSequence, t: f64) -> QueryResult<Value> {
        ensure_candidates(field, candidates)?;
        let points = candidates.points();

        // points[..split] are at or before t, points[split..] are after it
        let split = candidates.upper_bound(t);
        if split == 0 {
            return Ok(points[0].data.clone());
        }
        let before = split - 1;
        if split == points.len() {
            return Ok(points[before].data.clone());
        }

        // Among several candidates sharing the first later timestamp, the last
        // one occurs latest in the sequence
        let after_ts = points[split].timestamp;
        let after = split + points[split..].partition_point(|p| p.timestamp <= after_ts) - 1;

        let before_distance = t - points[before].timestamp;
        let after_distance = after_ts - t;
        let chosen = if after_distance <= before_distance {
            after
        } else {
            before
        };
        Ok(points[chosen].data.clone())
    }
}

/// Last candidate at or before `t`
#[derive(Debug, Clone, Copy, Default)]
pub struct BeforeInterpolator;

impl Interpolator for BeforeInterpolator {
    fn name(&self) -> &'static str {
        "before"
    }

    fn lookup(&self, field: &str, candidates: &CandidateSequence, t: f64) -> QueryResult<Value> {
        ensure_candidates(field, candidates)?;
        let split = candidates.upper_bound(t);
        Ok(match split {
            0 => Value::Null,
            n => candidates.points()[n - 1].data.clone(),
        })
    }
}

/// First candidate at or after `t`
#[derive(Debug, Clone, Copy, Default)]
pub struct AfterInterpolator;

impl Interpolator for AfterInterpolator {
    fn name(&self) -> &'static str {
        "after"
    }

    fn lookup(&self, field: &str, candidates: &CandidateSequence, t: f64) -> QueryResult<Value> {
        ensure_candidates(field, candidates)?;
        let index = candidates.lower_bound(t);
        Ok(candidates
            .points()
            .get(index)
            .map(|p| p.data.clone())
            .unwrap_or(Value::Null))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Name-keyed set of interpolators
#[derive(Clone, Default)]
pub struct InterpolatorRegistry {
    interpolators: HashMap<&'static str, Arc<dyn Interpolator>>,
}

impl InterpolatorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `closest`, `before` and `after`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ClosestInterpolator);
        registry.register(BeforeInterpolator);
        registry.register(AfterInterpolator);
        registry
    }

    /// The shared process-wide registry
    pub fn global() -> Arc<InterpolatorRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Add a strategy, replacing any existing one with the same name
    pub fn register(&mut self, interpolator: impl Interpolator + 'static) {
        self.interpolators
            .insert(interpolator.name(), Arc::new(interpolator));
    }

    /// Look up a strategy by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Interpolator>> {
        self.interpolators.get(name).cloned()
    }

    /// Whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.interpolators.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.interpolators.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for InterpolatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpolatorRegistry")
            .field("interpolators", &self.names())
            .finish()
    }
}
