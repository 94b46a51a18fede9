//! Stream merging
//!
//! Fuses several timestamp-ordered readers into one timestamp-ordered reader.
//! It is a standard k-way merge over a min-heap with a deterministic tie rule:
//!
//! - equal timestamps from different sources come out in source order
//!   (earlier in the merge list first)
//! - datapoints from the same source keep their relative order
//!
//! The heap holds at most one pending datapoint per source, which is what makes
//! the per-source order stable.
//!
//! ```text
//!  source 0: 1.1  2.1  2.9  3.5
//!  source 1: 1    2    3    3    3    4
//!                 │
//!                 ▼
//!  merged:   1(s1) 1.1(s0) 2(s1) 2.1(s0) 2.9(s0) 3(s1) 3(s1) 3(s1) 3.5(s0) 4(s1)
//! ```

use crate::engine::traits::DatapointReader;
use crate::query::error::{QueryError, QueryResult};
use crate::types::Datapoint;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Pending datapoint from one source
#[derive(Debug)]
struct HeapEntry {
    source: usize,
    point: Datapoint,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.point
            .timestamp
            .total_cmp(&other.point.timestamp)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// K-way merge over datapoint readers
///
/// The merger owns its sources. Closing the merger closes every source exactly
/// once, whether or not it was drained.
pub struct StreamMerger {
    sources: Vec<Box<dyn DatapointReader>>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    primed: bool,
    closed: bool,
}

impl StreamMerger {
    /// Create a merger; source order is tie-break precedence
    pub fn new(sources: Vec<Box<dyn DatapointReader>>) -> Self {
        let capacity = sources.len();
        Self {
            sources,
            heap: BinaryHeap::with_capacity(capacity),
            primed: false,
            closed: false,
        }
    }

    /// Number of merged sources
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Pull the next datapoint of `source` into the heap
    fn refill(&mut self, source: usize) -> QueryResult<()> {
        if let Some(point) = self.sources[source].next_datapoint()? {
            self.heap.push(Reverse(HeapEntry { source, point }));
        }
        Ok(())
    }

    fn prime(&mut self) -> QueryResult<()> {
        for source in 0..self.sources.len() {
            self.refill(source)?;
        }
        self.primed = true;
        Ok(())
    }
}

impl DatapointReader for StreamMerger {
    fn next_datapoint(&mut self) -> QueryResult<Option<Datapoint>> {
        if self.closed {
            return Err(QueryError::internal("read from a closed merge"));
        }
        if !self.primed {
            self.prime()?;
        }
        match self.heap.pop() {
            Some(Reverse(entry)) => {
                self.refill(entry.source)?;
                Ok(Some(entry.point))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.heap.clear();
        for source in &mut self.sources {
            source.close();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for StreamMerger {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Candidate Sequence
// ============================================================================

/// The merged, timestamp-ordered datapoints one dataset element searches
///
/// Built once per query and shared by every row of the output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSequence {
    points: Vec<Datapoint>,
}

impl CandidateSequence {
    /// Wrap datapoints that are already in non-decreasing timestamp order
    pub fn new(points: Vec<Datapoint>) -> Self {
        debug_assert!(points
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        Self { points }
    }

    /// Drain a reader (usually a [`StreamMerger`]) into a candidate sequence
    ///
    /// The reader is closed on every exit path.
    pub fn collect(reader: &mut dyn DatapointReader) -> QueryResult<Self> {
        reader.read_all().map(Self::new)
    }

    /// Number of candidates
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no candidates
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Candidates in merge order
    #[inline]
    pub fn points(&self) -> &[Datapoint] {
        &self.points
    }

    /// Index of the first candidate whose timestamp is greater than `t`
    ///
    /// Everything before the returned index has `timestamp <= t`.
    #[inline]
    pub fn upper_bound(&self, t: f64) -> usize {
        self.points.partition_point(|p| p.timestamp <= t)
    }

    /// Index of the first candidate whose timestamp is not less than `t`
    #[inline]
    pub fn lower_bound(&self, t: f64) -> usize {
        self.points.partition_point(|p| p.timestamp < t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::traits::VecReader;
    use serde_json::json;

    fn reader(points: &[(f64, &str)]) -> Box<dyn DatapointReader> {
        Box::new(VecReader::new(
            points
                .iter()
                .map(|&(t, d)| Datapoint::new(t, json!(d)))
                .collect(),
        ))
    }

    fn labels(points: &[Datapoint]) -> Vec<String> {
        points
            .iter()
            .map(|p| p.data.as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_merge_interleaves_by_timestamp() {
        let mut merger = StreamMerger::new(vec![
            reader(&[(1.0, "a1"), (3.0, "a3")]),
            reader(&[(2.0, "b2"), (4.0, "b4")]),
        ]);
        let merged = merger.read_all().unwrap();
        assert_eq!(labels(&merged), vec!["a1", "b2", "a3", "b4"]);
    }

    #[test]
    fn test_ties_follow_source_order() {
        let mut merger = StreamMerger::new(vec![
            reader(&[(3.0, "first")]),
            reader(&[(3.0, "second")]),
            reader(&[(3.0, "third")]),
        ]);
        let merged = merger.read_all().unwrap();
        assert_eq!(labels(&merged), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_same_source_duplicates_stay_stable() {
        let mut merger = StreamMerger::new(vec![
            reader(&[(2.9, "a"), (3.5, "b")]),
            reader(&[(3.0, "x"), (3.0, "y"), (3.0, "z")]),
        ]);
        let merged = merger.read_all().unwrap();
        assert_eq!(labels(&merged), vec!["a", "x", "y", "z", "b"]);
    }

    #[test]
    fn test_partially_empty_merge() {
        let mut merger = StreamMerger::new(vec![reader(&[]), reader(&[(1.0, "only")])]);
        let merged = merger.read_all().unwrap();
        assert_eq!(labels(&merged), vec!["only"]);
    }

    #[test]
    fn test_empty_merge_list() {
        let mut merger = StreamMerger::new(Vec::new());
        assert!(merger.read_all().unwrap().is_empty());
        assert!(merger.is_closed());
    }

    #[test]
    fn test_close_before_draining() {
        let mut merger = StreamMerger::new(vec![reader(&[(1.0, "a"), (2.0, "b")])]);
        assert!(merger.next_datapoint().unwrap().is_some());
        merger.close();
        assert!(merger.next_datapoint().is_err());
    }

    #[test]
    fn test_candidate_bounds() {
        let candidates = CandidateSequence::new(vec![
            Datapoint::new(1.0, json!(1)),
            Datapoint::new(3.0, json!(2)),
            Datapoint::new(3.0, json!(3)),
            Datapoint::new(5.0, json!(4)),
        ]);
        assert_eq!(candidates.lower_bound(3.0), 1);
        assert_eq!(candidates.upper_bound(3.0), 3);
        assert_eq!(candidates.upper_bound(0.0), 0);
        assert_eq!(candidates.lower_bound(6.0), 4);
    }
}
