//! Timeline construction
//!
//! The timeline is the ordered list of timestamps the output dataset is built
//! over. It comes from one of two places:
//!
//! - **Event-driven**: the primary stream's own datapoints, pulled lazily.
//!   Duplicate timestamps produce duplicate entries and each entry carries the
//!   primary datapoint's raw value.
//! - **Grid-driven**: `t1 + i*dt` for `i = 0, 1, ...` while the value is
//!   strictly below `t2`. Entries carry no primary value.

use crate::engine::traits::DatapointReader;
use crate::query::error::{QueryError, QueryResult};
use serde_json::Value;

/// One timeline position
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    /// Row timestamp
    pub timestamp: f64,
    /// Primary stream value (event-driven timelines only)
    pub primary: Option<Value>,
}

/// Fixed-step timestamp generator over `[t1, t2)`
#[derive(Debug, Clone)]
pub struct GridTimeline {
    start: f64,
    end: f64,
    step: f64,
    index: u64,
    last: Option<f64>,
}

impl GridTimeline {
    /// Create a grid; the caller has already checked `step > 0` and `start < end`
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        debug_assert!(step > 0.0 && start < end);
        Self {
            start,
            end,
            step,
            index: 0,
            last: None,
        }
    }

    /// Upper bound on the number of timestamps the grid will produce
    ///
    /// Computed without generating the grid, so it can be checked against
    /// resource limits up front. Exact unless `step` is finer than the float
    /// spacing around `start`.
    pub fn point_count(start: f64, end: f64, step: f64) -> f64 {
        if !(step > 0.0) || !(start < end) {
            return 0.0;
        }
        ((end - start) / step).ceil()
    }

    fn next_timestamp(&mut self) -> Option<f64> {
        loop {
            // Multiply rather than accumulate so rounding error does not drift
            let t = self.start + self.index as f64 * self.step;
            if !(t < self.end) {
                return None;
            }
            self.index += 1;
            // Steps below float resolution round onto the previous timestamp
            if self.last.map_or(true, |last| t > last) {
                self.last = Some(t);
                return Some(t);
            }
        }
    }
}

impl Iterator for GridTimeline {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        self.next_timestamp()
    }
}

/// Source of timeline entries
pub enum Timeline {
    /// Rows follow the primary stream
    Event(Box<dyn DatapointReader>),
    /// Rows sit on a fixed grid
    Grid(GridTimeline),
}

impl Timeline {
    /// Whether rows carry a primary value
    pub fn is_event_driven(&self) -> bool {
        matches!(self, Timeline::Event(_))
    }

    /// Next timeline entry, `None` at the end
    pub fn next_entry(&mut self) -> QueryResult<Option<TimelineEntry>> {
        match self {
            Timeline::Event(reader) => Ok(reader.next_datapoint()?.map(|point| TimelineEntry {
                timestamp: point.timestamp,
                primary: Some(point.data),
            })),
            Timeline::Grid(grid) => Ok(grid.next().map(|timestamp| TimelineEntry {
                timestamp,
                primary: None,
            })),
        }
    }

    /// Close the primary reader, if there is one
    pub fn close(&mut self) {
        if let Timeline::Event(reader) = self {
            reader.close();
        }
    }

    /// Reject grids that the caller could not have validated
    pub fn grid(start: f64, end: f64, step: f64) -> QueryResult<Self> {
        if !(step > 0.0) || !(start < end) {
            return Err(QueryError::no_timeline(format!(
                "grid needs dt > 0 and t1 < t2 (dt={}, t1={}, t2={})",
                step, start, end
            )));
        }
        Ok(Timeline::Grid(GridTimeline::new(start, end, step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::traits::VecReader;
    use crate::types::Datapoint;
    use serde_json::json;

    #[test]
    fn test_grid_excludes_upper_bound() {
        let grid: Vec<f64> = GridTimeline::new(0.0, 5.0, 1.0).collect();
        assert_eq!(grid, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_grid_partial_last_step() {
        let grid: Vec<f64> = GridTimeline::new(1.0, 2.0, 0.3).collect();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[0], 1.0);
        assert!(grid.iter().all(|&t| t < 2.0));
        assert_eq!(GridTimeline::point_count(1.0, 2.0, 0.3), 4.0);
    }

    #[test]
    fn test_grid_step_is_exact() {
        let grid: Vec<f64> = GridTimeline::new(0.0, 1.0, 0.1).collect();
        assert_eq!(grid.len(), 10);
        assert_eq!(grid[7], 7.0 * 0.1);
    }

    #[test]
    fn test_grid_below_float_resolution_stays_unique() {
        let start = 1e17;
        let grid: Vec<f64> = GridTimeline::new(start, start + 1e4, 1.0).collect();
        assert!(!grid.is_empty());
        assert_eq!(grid[0], start);
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
        assert!(grid.iter().all(|&t| t < start + 1e4));
        assert!(grid.len() as f64 <= GridTimeline::point_count(start, start + 1e4, 1.0));
    }

    #[test]
    fn test_grid_rejects_invalid_parameters() {
        assert!(Timeline::grid(0.0, 5.0, 0.0).is_err());
        assert!(Timeline::grid(0.0, 5.0, -1.0).is_err());
        assert!(Timeline::grid(5.0, 5.0, 1.0).is_err());
        assert!(Timeline::grid(0.0, 5.0, f64::NAN).is_err());
        assert_eq!(GridTimeline::point_count(5.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_event_timeline_keeps_duplicates() {
        let reader = VecReader::new(vec![
            Datapoint::new(1.0, json!(1)),
            Datapoint::new(3.0, json!(2)),
            Datapoint::new(3.0, json!(3)),
        ]);
        let mut timeline = Timeline::Event(Box::new(reader));
        assert!(timeline.is_event_driven());

        let mut entries = Vec::new();
        while let Some(entry) = timeline.next_entry().unwrap() {
            entries.push(entry);
        }
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].timestamp, 3.0);
        assert_eq!(entries[2].timestamp, 3.0);
        assert_eq!(entries[2].primary, Some(json!(3)));
        timeline.close();
    }

    #[test]
    fn test_grid_entries_have_no_primary() {
        let mut timeline = Timeline::grid(0.0, 2.0, 1.0).unwrap();
        let entry = timeline.next_entry().unwrap().unwrap();
        assert_eq!(entry, TimelineEntry { timestamp: 0.0, primary: None });
    }
}
