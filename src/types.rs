//! Core data types shared by the query engine and the stream accessors
//!
//! # Key Types
//!
//! - **`Datapoint`**: A single stream sample (timestamp + arbitrary JSON value)
//! - **`TimeWindow`**: A half-open `[t1, t2)` window where `0` means "unbounded"
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tsdataset::types::{Datapoint, TimeWindow};
//!
//! let point = Datapoint::new(1.5, json!({"temperature": 21.3}));
//! assert_eq!(point.timestamp, 1.5);
//!
//! // Lower bound only; the upper bound is the unbounded sentinel
//! let window = TimeWindow::new(1.0, 0.0);
//! assert!(window.contains(1.0));
//! assert!(window.contains(1e12));
//! assert!(!window.contains(0.5));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of the row field that carries the primary stream's value
///
/// The field is reserved: a dataset may not declare an element with this name.
pub const PRIMARY_FIELD: &str = "x";

/// A single time-series sample
///
/// Timestamps are floating point seconds. The payload is any JSON value, so a
/// datapoint can carry a scalar reading, an object, or (for assembled dataset
/// rows) a mapping of field name to value.
///
/// The JSON form is `{"t": <timestamp>, "d": <data>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Sample time
    #[serde(rename = "t")]
    pub timestamp: f64,

    /// Sample payload
    #[serde(rename = "d")]
    pub data: Value,
}

impl Datapoint {
    /// Create a new datapoint
    pub fn new(timestamp: f64, data: impl Into<Value>) -> Self {
        Self {
            timestamp,
            data: data.into(),
        }
    }
}

impl fmt::Display for Datapoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp, self.data)
    }
}

/// Half-open time window `[start, end)` with sentinel bounds
///
/// A bound equal to `0.0` means the window is unbounded in that direction.
/// This matches the `t1`/`t2` convention used by stream queries, where
/// leaving a bound unset (zero) reads the whole stream on that side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound (`0.0` = unbounded)
    pub start: f64,

    /// Exclusive upper bound (`0.0` = unbounded)
    pub end: f64,
}

impl TimeWindow {
    /// Create a window from sentinel-style bounds
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// A window that admits every timestamp
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether the lower bound is set
    #[inline]
    pub fn has_start(&self) -> bool {
        self.start != 0.0
    }

    /// Whether the upper bound is set
    #[inline]
    pub fn has_end(&self) -> bool {
        self.end != 0.0
    }

    /// Check whether a timestamp falls inside the window
    #[inline]
    pub fn contains(&self, timestamp: f64) -> bool {
        (!self.has_start() || timestamp >= self.start) && (!self.has_end() || timestamp < self.end)
    }
}
