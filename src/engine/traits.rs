//! Core trait definitions for the pluggable stream layer
//!
//! The dataset engine never touches storage directly. It consumes two
//! capabilities: a [`StreamAccessor`] that resolves stream paths and opens
//! readers, and the [`DatapointReader`] those readers implement.

use crate::query::error::{QueryError, QueryResult};
use crate::types::Datapoint;

// =============================================================================
// DatapointReader Trait
// =============================================================================

/// Forward-only sequence of datapoints with an explicit release step
///
/// A reader is opened when it is fetched and holds its underlying resources
/// until [`close`](DatapointReader::close) is called. Implementations must:
///
/// - deliver datapoints in non-decreasing timestamp order
/// - make `close` idempotent (a second call is a no-op)
/// - refuse reads after `close` with an error
/// - release their resources on drop if the owner never closed them
pub trait DatapointReader: Send {
    /// Pull the next datapoint
    ///
    /// Returns:
    /// - `Ok(Some(point))` - More data available
    /// - `Ok(None)` - End of sequence
    /// - `Err(e)` - Read failed or the reader was already closed
    fn next_datapoint(&mut self) -> QueryResult<Option<Datapoint>>;

    /// Release all held resources
    fn close(&mut self);

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;

    /// Drain the remaining datapoints and close the reader
    ///
    /// The reader is closed on every exit path, including errors.
    fn read_all(&mut self) -> QueryResult<Vec<Datapoint>> {
        let mut points = Vec::new();
        loop {
            match self.next_datapoint() {
                Ok(Some(point)) => points.push(point),
                Ok(None) => break,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
        self.close();
        Ok(points)
    }
}

/// Reader over an already materialized vector
///
/// Used for empty results and for adapters that compute their output eagerly.
#[derive(Debug, Default)]
pub struct VecReader {
    points: std::vec::IntoIter<Datapoint>,
    closed: bool,
}

impl VecReader {
    /// Create a reader that yields `points` in order
    pub fn new(points: Vec<Datapoint>) -> Self {
        Self {
            points: points.into_iter(),
            closed: false,
        }
    }
}

impl DatapointReader for VecReader {
    fn next_datapoint(&mut self) -> QueryResult<Option<Datapoint>> {
        if self.closed {
            return Err(QueryError::internal("read from a closed sequence"));
        }
        Ok(self.points.next())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.points = Vec::new().into_iter();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// =============================================================================
// StreamAccessor Trait
// =============================================================================

/// Resolves stream paths and opens readers over their datapoints
///
/// Bounds follow the stream query convention: the window is `[t1, t2)` and a
/// bound of `0.0` is unbounded in that direction.
pub trait StreamAccessor: Send + Sync {
    /// Read-only existence probe
    fn exists(&self, path: &str) -> bool;

    /// Open a reader over the stream's datapoints inside `[t1, t2)`
    ///
    /// Returns a `StreamNotFound` error when the path does not resolve.
    fn fetch(&self, path: &str, t1: f64, t2: f64) -> QueryResult<Box<dyn DatapointReader>>;
}

impl<A: StreamAccessor + ?Sized> StreamAccessor for std::sync::Arc<A> {
    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }

    fn fetch(&self, path: &str, t1: f64, t2: f64) -> QueryResult<Box<dyn DatapointReader>> {
        (**self).fetch(path, t1, t2)
    }
}
