//! In-memory stream store
//!
//! `InMemoryStreamAccessor` keeps every stream as a shared, timestamp-ordered
//! vector. Readers take a cheap `Arc` snapshot, so writes that land while a
//! query is running never disturb the datapoints that query already sees.
//!
//! The store counts every reader it opens and every reader that gets closed.
//! Comparing the two is how the dataset engine's close contract is verified.

use crate::engine::traits::{DatapointReader, StreamAccessor};
use crate::error::{Result, StorageError};
use crate::query::error::{QueryError, QueryResult};
use crate::types::{Datapoint, TimeWindow};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Reader open/close counters
#[derive(Debug, Default)]
struct ReaderCounters {
    opened: AtomicU64,
    closed: AtomicU64,
}

/// Snapshot of reader bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessorStats {
    /// Readers handed out by `fetch`
    pub opened: u64,
    /// Readers that have been closed (explicitly or on drop)
    pub closed: u64,
}

impl AccessorStats {
    /// Readers that are still holding resources
    pub fn open_readers(&self) -> u64 {
        self.opened.saturating_sub(self.closed)
    }
}

/// Stream accessor backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryStreamAccessor {
    streams: RwLock<HashMap<String, Arc<Vec<Datapoint>>>>,
    counters: Arc<ReaderCounters>,
}

impl InMemoryStreamAccessor {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from a JSON file of the form `{"path": [{"t":..,"d":..}, ...]}`
    pub fn load_json_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let streams: HashMap<String, Vec<Datapoint>> = serde_json::from_str(&contents)?;
        let count = streams.len();
        for (stream, points) in streams {
            self.insert(stream, points)?;
        }
        debug!(
            file = %path.as_ref().display(),
            streams = count,
            "Loaded streams from seed file"
        );
        Ok(count)
    }

    /// Append datapoints to a stream, creating it if needed
    ///
    /// Inserting an empty vector creates an existing-but-empty stream.
    ///
    /// # Errors
    ///
    /// - `InvalidPath` if the path fails sanitation
    /// - `NonFiniteTimestamp` for NaN or infinite timestamps
    /// - `OutOfOrder` if a timestamp is lower than its predecessor
    pub fn insert(&self, path: impl Into<String>, points: Vec<Datapoint>) -> Result<()> {
        let path = path.into();
        validate_stream_path(&path)?;

        let mut streams = self.streams.write();
        let previous = streams
            .get(&path)
            .and_then(|existing| existing.last())
            .map(|p| p.timestamp);

        let mut last = previous;
        for point in &points {
            if !point.timestamp.is_finite() {
                return Err(StorageError::NonFiniteTimestamp(path).into());
            }
            if let Some(prev) = last {
                if point.timestamp < prev {
                    return Err(StorageError::OutOfOrder {
                        path,
                        previous: prev,
                        timestamp: point.timestamp,
                    }
                    .into());
                }
            }
            last = Some(point.timestamp);
        }

        let entry = streams.entry(path).or_default();
        // Copy-on-write: open readers keep their snapshot
        Arc::make_mut(entry).extend(points);
        Ok(())
    }

    /// Remove a stream, returning whether it existed
    pub fn remove(&self, path: &str) -> bool {
        self.streams.write().remove(path).is_some()
    }

    /// All stream paths, sorted
    pub fn stream_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.streams.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of datapoints stored for a stream
    pub fn stream_len(&self, path: &str) -> Option<usize> {
        self.streams.read().get(path).map(|s| s.len())
    }

    /// Reader bookkeeping snapshot
    pub fn stats(&self) -> AccessorStats {
        AccessorStats {
            opened: self.counters.opened.load(Ordering::Acquire),
            closed: self.counters.closed.load(Ordering::Acquire),
        }
    }
}

impl StreamAccessor for InMemoryStreamAccessor {
    fn exists(&self, path: &str) -> bool {
        self.streams.read().contains_key(path)
    }

    fn fetch(&self, path: &str, t1: f64, t2: f64) -> QueryResult<Box<dyn DatapointReader>> {
        let points = self
            .streams
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| QueryError::stream_not_found(path))?;

        let window = TimeWindow::new(t1, t2);
        let start = if window.has_start() {
            points.partition_point(|p| p.timestamp < window.start)
        } else {
            0
        };
        let end = if window.has_end() {
            points.partition_point(|p| p.timestamp < window.end)
        } else {
            points.len()
        };

        self.counters.opened.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryReader {
            points,
            position: start,
            end: end.max(start),
            closed: false,
            counters: Arc::clone(&self.counters),
        }))
    }
}

/// Reader over a snapshot of one stream
struct MemoryReader {
    points: Arc<Vec<Datapoint>>,
    position: usize,
    end: usize,
    closed: bool,
    counters: Arc<ReaderCounters>,
}

impl DatapointReader for MemoryReader {
    fn next_datapoint(&mut self) -> QueryResult<Option<Datapoint>> {
        if self.closed {
            return Err(QueryError::internal("read from a closed stream reader"));
        }
        if self.position >= self.end {
            return Ok(None);
        }
        let point = self.points[self.position].clone();
        self.position += 1;
        Ok(Some(point))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.points = Arc::new(Vec::new());
            self.counters.closed.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a stream path
///
/// Paths are `/`-separated names. Empty paths, empty segments, whitespace,
/// backslashes and `?` are rejected.
pub fn validate_stream_path(path: &str) -> std::result::Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.split('/').any(str::is_empty)
        || path
            .chars()
            .any(|c| c.is_whitespace() || c == '\\' || c == '?');
    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
