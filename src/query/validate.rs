//! Dataset query validation
//!
//! Runs before any datapoint is read. The only contact with storage is the
//! accessor's read-only `exists` probe. Rules are checked in a fixed order and
//! the first failure is returned:
//!
//! 1. the dataset has at least one element
//! 2. no element is named `"x"`
//! 3. a timeline can be built (primary stream, or `dt > 0` and `t1 < t2`)
//! 4. every referenced stream exists
//! 5. every interpolator is registered
//! 6. a grid timeline stays under the configured point limit

use crate::config::QueryConfig;
use crate::engine::traits::StreamAccessor;
use crate::types::PRIMARY_FIELD;

use super::ast::DatasetQuery;
use super::error::{QueryError, QueryResult};
use super::interpolator::InterpolatorRegistry;
use super::timeline::GridTimeline;

/// Checks a [`DatasetQuery`] against a stream accessor and interpolator registry
pub struct QueryValidator<'a> {
    accessor: &'a dyn StreamAccessor,
    registry: &'a InterpolatorRegistry,
    config: &'a QueryConfig,
}

impl<'a> QueryValidator<'a> {
    /// Create a validator
    pub fn new(
        accessor: &'a dyn StreamAccessor,
        registry: &'a InterpolatorRegistry,
        config: &'a QueryConfig,
    ) -> Self {
        Self {
            accessor,
            registry,
            config,
        }
    }

    /// Apply every rule in order
    pub fn validate(&self, query: &DatasetQuery) -> QueryResult<()> {
        if query.dataset.is_empty() {
            return Err(QueryError::empty_dataset());
        }

        if query.dataset.contains_key(PRIMARY_FIELD) {
            return Err(QueryError::reserved_field(PRIMARY_FIELD));
        }

        self.check_timeline(query)?;

        if let Some(missing) = query
            .referenced_streams()
            .find(|q| !self.accessor.exists(&q.stream))
        {
            return Err(QueryError::stream_not_found(&missing.stream));
        }

        for (field, element) in &query.dataset {
            if !self.registry.contains(&element.interpolator) {
                return Err(QueryError::unknown_interpolator(field, &element.interpolator));
            }
        }

        if query.is_grid() {
            self.check_grid_size(query)?;
        }

        Ok(())
    }

    fn check_timeline(&self, query: &DatasetQuery) -> QueryResult<()> {
        if !query.is_grid() {
            return Ok(());
        }
        let (t1, t2) = (query.primary.t1, query.primary.t2);
        if query.dt > 0.0 && t1 < t2 {
            return Ok(());
        }
        Err(QueryError::no_timeline(format!(
            "no primary stream and no valid grid (dt={}, t1={}, t2={}); \
             set 'stream' or use dt > 0 with t1 < t2",
            query.dt, t1, t2
        )))
    }

    fn check_grid_size(&self, query: &DatasetQuery) -> QueryResult<()> {
        let points = GridTimeline::point_count(query.primary.t1, query.primary.t2, query.dt);
        if points > self.config.max_grid_points as f64 {
            return Err(QueryError::resource_limit(format!(
                "grid of {} points exceeds the limit of {}",
                points, self.config.max_grid_points
            )));
        }
        Ok(())
    }
}
