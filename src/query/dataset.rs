//! Dataset assembly
//!
//! [`DatasetReader`] is the output sequence of a dataset query. Each pull takes
//! the next timeline entry, samples every element's candidate sequence at that
//! timestamp and emits one row:
//!
//! ```text
//! timeline entry (t, primary)          row
//!        │                               {"x": primary,        (event mode only)
//!        ├── element "hr"  ── closest ──▶  "hr": value,
//!        └── element "loc" ── before  ──▶  "loc": value}
//!                                          │
//!                                          ▼ post_transform (optional)
//!                                        scalar
//! ```
//!
//! Any error closes the reader before it is returned, so a failed sequence
//! never holds stream resources.

use crate::engine::traits::DatapointReader;
use crate::metrics;
use crate::transform::ExpressionEvaluator;
use crate::types::{Datapoint, PRIMARY_FIELD};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{QueryError, QueryResult};
use super::interpolator::Interpolator;
use super::merge::CandidateSequence;
use super::timeline::{Timeline, TimelineEntry};

/// A named output field with its materialized candidates
pub struct ResolvedElement {
    name: String,
    candidates: CandidateSequence,
    interpolator: Arc<dyn Interpolator>,
}

impl ResolvedElement {
    /// Bind a field name to its candidates and lookup strategy
    pub fn new(
        name: impl Into<String>,
        candidates: CandidateSequence,
        interpolator: Arc<dyn Interpolator>,
    ) -> Self {
        Self {
            name: name.into(),
            candidates,
            interpolator,
        }
    }

    /// Output field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Merged candidates
    pub fn candidates(&self) -> &CandidateSequence {
        &self.candidates
    }

    fn sample(&self, t: f64) -> QueryResult<Value> {
        self.interpolator.lookup(&self.name, &self.candidates, t)
    }
}

/// Row-to-scalar expression bound to an evaluator
pub struct PostTransform {
    expression: String,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl PostTransform {
    /// Bind an expression to an evaluator
    pub fn new(expression: impl Into<String>, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            expression: expression.into(),
            evaluator,
        }
    }

    /// Expression text
    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn apply(&self, fields: &Map<String, Value>) -> QueryResult<Value> {
        let lookup = |name: &str| fields.get(name).cloned();
        self.evaluator
            .evaluate(&self.expression, &lookup)
            .map_err(|e| {
                QueryError::evaluation(format!("post_transform '{}': {}", self.expression, e))
                    .with_source(e)
            })
    }
}

/// Forward-only sequence of assembled dataset rows
///
/// Closing the reader closes the primary stream reader (event mode) and drops
/// the candidate sequences. Dropping an unclosed reader closes it.
pub struct DatasetReader {
    timeline: Timeline,
    elements: Vec<ResolvedElement>,
    transform: Option<PostTransform>,
    rows: u64,
    closed: bool,
}

impl DatasetReader {
    /// Assemble rows over `timeline` from `elements`
    pub fn new(
        timeline: Timeline,
        elements: Vec<ResolvedElement>,
        transform: Option<PostTransform>,
    ) -> Self {
        Self {
            timeline,
            elements,
            transform,
            rows: 0,
            closed: false,
        }
    }

    /// Rows handed out so far
    pub fn rows_produced(&self) -> u64 {
        self.rows
    }

    /// Whether rows follow a primary stream
    pub fn is_event_driven(&self) -> bool {
        self.timeline.is_event_driven()
    }

    fn build_row(&self, entry: TimelineEntry) -> QueryResult<Datapoint> {
        let mut fields = Map::new();
        if let Some(primary) = entry.primary {
            fields.insert(PRIMARY_FIELD.to_string(), primary);
        }
        for element in &self.elements {
            fields.insert(element.name.clone(), element.sample(entry.timestamp)?);
        }

        let data = match &self.transform {
            Some(transform) => transform.apply(&fields)?,
            None => Value::Object(fields),
        };
        Ok(Datapoint::new(entry.timestamp, data))
    }
}

impl DatapointReader for DatasetReader {
    fn next_datapoint(&mut self) -> QueryResult<Option<Datapoint>> {
        if self.closed {
            return Err(QueryError::internal("read from a closed dataset"));
        }

        let result = match self.timeline.next_entry() {
            Ok(Some(entry)) => self.build_row(entry).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(row)) => {
                self.rows += 1;
                Ok(Some(row))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(
                    kind = %e.kind,
                    error = %e.message,
                    row = self.rows,
                    "Dataset query failed while producing rows"
                );
                metrics::record_error(e.kind.as_str());
                self.close();
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.timeline.close();
        self.elements.clear();
        metrics::record_rows(self.rows);
        debug!(rows = self.rows, "Dataset sequence closed");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for DatasetReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::traits::VecReader;
    use crate::query::error::QueryErrorKind;
    use crate::query::interpolator::{BeforeInterpolator, ClosestInterpolator};
    use crate::transform::TransformEvaluator;
    use serde_json::json;

    fn points(pairs: &[(f64, i64)]) -> Vec<Datapoint> {
        pairs.iter().map(|&(t, d)| Datapoint::new(t, json!(d))).collect()
    }

    fn closest(name: &str, pairs: &[(f64, i64)]) -> ResolvedElement {
        ResolvedElement::new(
            name,
            CandidateSequence::new(points(pairs)),
            Arc::new(ClosestInterpolator),
        )
    }

    fn event_timeline(pairs: &[(f64, i64)]) -> Timeline {
        Timeline::Event(Box::new(VecReader::new(points(pairs))))
    }

    #[test]
    fn test_event_rows_carry_primary_value() {
        let mut reader = DatasetReader::new(
            event_timeline(&[(1.0, 10), (2.0, 20)]),
            vec![closest("y", &[(1.1, 1), (1.9, 2)])],
            None,
        );

        let rows = reader.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 1.0);
        assert_eq!(rows[0].data, json!({"x": 10, "y": 1}));
        assert_eq!(rows[1].data, json!({"x": 20, "y": 2}));
        assert!(reader.is_closed());
        assert_eq!(reader.rows_produced(), 2);
    }

    #[test]
    fn test_grid_rows_have_no_primary() {
        let mut reader = DatasetReader::new(
            Timeline::grid(0.0, 2.0, 1.0).unwrap(),
            vec![
                closest("a", &[(0.0, 1), (1.0, 2)]),
                ResolvedElement::new(
                    "b",
                    CandidateSequence::new(points(&[(0.5, 7)])),
                    Arc::new(BeforeInterpolator),
                ),
            ],
            None,
        );
        assert!(!reader.is_event_driven());

        let rows = reader.read_all().unwrap();
        assert_eq!(rows[0].data, json!({"a": 1, "b": null}));
        assert_eq!(rows[1].data, json!({"a": 2, "b": 7}));
    }

    #[test]
    fn test_post_transform_replaces_row() {
        let transform = PostTransform::new("$('x') + $('y')", Arc::new(TransformEvaluator::new()));
        let mut reader = DatasetReader::new(
            event_timeline(&[(1.0, 10)]),
            vec![closest("y", &[(1.0, 5)])],
            Some(transform),
        );
        let rows = reader.read_all().unwrap();
        assert_eq!(rows, vec![Datapoint::new(1.0, json!(15))]);
    }

    #[test]
    fn test_evaluation_error_closes_reader() {
        let transform = PostTransform::new("$('z')", Arc::new(TransformEvaluator::new()));
        let mut reader = DatasetReader::new(
            event_timeline(&[(1.0, 10), (2.0, 20)]),
            vec![closest("y", &[(1.0, 5)])],
            Some(transform),
        );

        let err = reader.next_datapoint().unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::EvaluationError);
        assert!(std::error::Error::source(&err).is_some());
        assert!(reader.is_closed());
        assert_eq!(reader.next_datapoint().unwrap_err().kind, QueryErrorKind::Internal);
    }

    #[test]
    fn test_empty_candidates_error_on_first_row() {
        let mut reader = DatasetReader::new(
            event_timeline(&[(1.0, 10)]),
            vec![closest("y", &[])],
            None,
        );
        let err = reader.next_datapoint().unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::EmptyCandidateSequence);
        assert!(reader.is_closed());
    }

    #[test]
    fn test_empty_timeline_never_touches_candidates() {
        let mut reader = DatasetReader::new(event_timeline(&[]), vec![closest("y", &[])], None);
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut reader = DatasetReader::new(
            event_timeline(&[(1.0, 10)]),
            vec![closest("y", &[(1.0, 5)])],
            None,
        );
        reader.close();
        reader.close();
        assert!(reader.is_closed());
    }
}
