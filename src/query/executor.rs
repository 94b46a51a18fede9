//! Dataset query execution
//!
//! [`DatasetEngine::run`] is the single entry point of the dataset core:
//!
//! 1. validate the query (no datapoint is read on failure)
//! 2. open the timeline: the primary stream reader, or a grid
//! 3. for each element, fetch every member stream, merge them and materialize
//!    the candidate sequence, closing the member readers
//! 4. hand back a [`DatasetReader`] that assembles rows on demand
//!
//! If step 2 or 3 fails, everything opened so far is closed before the error
//! is returned.

use crate::config::QueryConfig;
use crate::engine::traits::{DatapointReader, StreamAccessor};
use crate::metrics;
use crate::transform::{ExpressionEvaluator, TransformEvaluator};
use crate::types::Datapoint;
use lazy_static::lazy_static;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::ast::{DatasetQuery, DatasetQueryElement, StreamQuery};
use super::dataset::{DatasetReader, PostTransform, ResolvedElement};
use super::error::{QueryError, QueryErrorKind, QueryResult};
use super::interpolator::InterpolatorRegistry;
use super::merge::{CandidateSequence, StreamMerger};
use super::timeline::Timeline;
use super::validate::QueryValidator;

lazy_static! {
    /// Evaluator shared by default engines so parsed expressions are reused
    static ref DEFAULT_EVALUATOR: Arc<TransformEvaluator> = Arc::new(TransformEvaluator::new());
}

/// Runs dataset queries
///
/// Holds no per-query state; one engine can serve concurrent queries.
#[derive(Clone)]
pub struct DatasetEngine {
    registry: Arc<InterpolatorRegistry>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    config: QueryConfig,
}

impl Default for DatasetEngine {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl DatasetEngine {
    /// Engine with the global interpolator registry and built-in evaluator
    pub fn new(config: QueryConfig) -> Self {
        let evaluator: Arc<dyn ExpressionEvaluator> = Arc::clone(&DEFAULT_EVALUATOR) as _;
        Self {
            registry: InterpolatorRegistry::global(),
            evaluator,
            config,
        }
    }

    /// Use a custom interpolator registry
    pub fn with_registry(mut self, registry: Arc<InterpolatorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use a custom expression evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replace the query limits
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    /// Query limits in effect
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Interpolators available to queries
    pub fn registry(&self) -> &InterpolatorRegistry {
        &self.registry
    }

    /// Validate a query without opening any stream
    pub fn validate(&self, query: &DatasetQuery, accessor: &dyn StreamAccessor) -> QueryResult<()> {
        let started = Instant::now();
        let result = QueryValidator::new(accessor, &self.registry, &self.config).validate(query);
        metrics::record_validation(started.elapsed().as_secs_f64());
        result
    }

    /// Validate and execute a query
    ///
    /// The caller owns the returned sequence and must close it on every path.
    pub fn run(&self, query: &DatasetQuery, accessor: &dyn StreamAccessor) -> QueryResult<DatasetReader> {
        let mode = if query.is_grid() { "grid" } else { "event" };

        if let Err(e) = self.validate(query, accessor) {
            debug!(kind = %e.kind, error = %e.message, "Dataset query rejected");
            metrics::record_query(mode, "rejected");
            metrics::record_error(e.kind.as_str());
            return Err(e);
        }

        debug!(
            mode,
            elements = query.dataset.len(),
            post_transform = query.transform_expression().is_some(),
            "Running dataset query"
        );

        match self.open(query, accessor) {
            Ok(reader) => {
                metrics::record_query(mode, "ok");
                Ok(reader)
            }
            Err(e) => {
                warn!(kind = %e.kind, error = %e.message, "Dataset query failed to open streams");
                metrics::record_query(mode, "failed");
                metrics::record_error(e.kind.as_str());
                Err(e)
            }
        }
    }

    /// Run a query and drain its output
    pub fn collect(&self, query: &DatasetQuery, accessor: &dyn StreamAccessor) -> QueryResult<Vec<Datapoint>> {
        self.run(query, accessor)?.read_all()
    }

    fn open(&self, query: &DatasetQuery, accessor: &dyn StreamAccessor) -> QueryResult<DatasetReader> {
        let mut timeline = if query.is_grid() {
            Timeline::grid(query.primary.t1, query.primary.t2, query.dt)?
        } else {
            Timeline::Event(fetch(accessor, &query.primary)?)
        };

        let mut elements = Vec::with_capacity(query.dataset.len());
        for (name, element) in &query.dataset {
            match self.resolve(name, element, accessor) {
                Ok(resolved) => elements.push(resolved),
                Err(e) => {
                    timeline.close();
                    return Err(e);
                }
            }
        }

        let transform = query
            .transform_expression()
            .map(|expression| PostTransform::new(expression, Arc::clone(&self.evaluator)));

        Ok(DatasetReader::new(timeline, elements, transform))
    }

    /// Fetch, merge and materialize one element's candidates
    fn resolve(
        &self,
        name: &str,
        element: &DatasetQueryElement,
        accessor: &dyn StreamAccessor,
    ) -> QueryResult<ResolvedElement> {
        let interpolator = self
            .registry
            .get(&element.interpolator)
            .ok_or_else(|| QueryError::unknown_interpolator(name, &element.interpolator))?;

        let mut sources: Vec<Box<dyn DatapointReader>> = Vec::with_capacity(element.streams().len());
        for stream in element.streams() {
            match fetch(accessor, stream) {
                Ok(reader) => sources.push(reader),
                Err(e) => {
                    for source in &mut sources {
                        source.close();
                    }
                    return Err(e);
                }
            }
        }

        let mut merger = StreamMerger::new(sources);
        let candidates = CandidateSequence::collect(&mut merger)?;
        debug!(
            field = name,
            sources = merger.source_count(),
            candidates = candidates.len(),
            "Resolved dataset element"
        );
        Ok(ResolvedElement::new(name, candidates, interpolator))
    }
}

/// Open one stream; a stream that vanished after validation is a storage failure
fn fetch(accessor: &dyn StreamAccessor, query: &StreamQuery) -> QueryResult<Box<dyn DatapointReader>> {
    accessor
        .fetch(&query.stream, query.t1, query.t2)
        .map_err(|e| match e.kind {
            QueryErrorKind::StreamNotFound => QueryError::storage(format!(
                "stream '{}' disappeared before it could be read",
                query.stream
            ))
            .with_source(e),
            _ => e,
        })
}
