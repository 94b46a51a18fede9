//! Dataset query definitions
//!
//! A dataset query names a primary timeline and a set of output fields. Each
//! field reads one stream, or a merge of several, and is sampled onto the
//! timeline by an interpolator.
//!
//! # Timeline Modes
//!
//! - **Event-driven**: `stream` is set. Output rows follow the primary stream's
//!   datapoints one-for-one and carry its value in the `"x"` field.
//! - **Grid-driven**: `stream` is empty. Output rows sit on `t1, t1+dt, ...`
//!   strictly below `t2`.
//!
//! # Example
//!
//! ```rust
//! use tsdataset::query::{DatasetQuery, DatasetQueryElement, StreamQuery};
//!
//! let query = DatasetQuery::event(StreamQuery::new("alice/phone/steps"))
//!     .with_element(
//!         "heart_rate",
//!         DatasetQueryElement::single(StreamQuery::new("alice/watch/heart_rate"), "closest"),
//!     )
//!     .with_post_transform("$('x') > 100");
//!
//! assert!(!query.is_grid());
//! assert_eq!(query.referenced_streams().count(), 2);
//! ```
//!
//! The JSON form accepted by the REST layer:
//!
//! ```json
//! {
//!   "stream": "alice/phone/steps",
//!   "t1": 0, "t2": 0, "dt": 0,
//!   "dataset": {
//!     "heart_rate": {"stream": "alice/watch/heart_rate", "interpolator": "closest"},
//!     "location":   {"merge": [{"stream": "alice/phone/gps"}, {"stream": "alice/car/gps"}],
//!                    "interpolator": "closest"}
//!   },
//!   "post_transform": "$('x') > 100"
//! }
//! ```

use crate::engine::traits::StreamAccessor;
use crate::types::TimeWindow;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dataset::DatasetReader;
use super::error::QueryResult;
use super::executor::DatasetEngine;

// ============================================================================
// Stream Query
// ============================================================================

/// A single stream with an optional time window
///
/// `t1` and `t2` are sentinel bounds: `0.0` means unbounded in that direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamQuery {
    /// Stream path (may be empty for a grid-driven primary)
    #[serde(default)]
    pub stream: String,

    /// Inclusive lower bound
    #[serde(default)]
    pub t1: f64,

    /// Exclusive upper bound
    #[serde(default)]
    pub t2: f64,
}

impl StreamQuery {
    /// Query an entire stream
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            t1: 0.0,
            t2: 0.0,
        }
    }

    /// Restrict to the window `[t1, t2)`
    pub fn with_window(mut self, t1: f64, t2: f64) -> Self {
        self.t1 = t1;
        self.t2 = t2;
        self
    }

    /// The query's time window
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.t1, self.t2)
    }
}

// ============================================================================
// Dataset Elements
// ============================================================================

/// Where a dataset element reads its candidates from
///
/// Both forms are normalized into one merged candidate sequence before any
/// interpolation happens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ElementSource {
    /// Several streams merged by timestamp; list order breaks ties
    Merge {
        /// Streams in precedence order
        merge: Vec<StreamQuery>,
    },
    /// One stream
    Single(StreamQuery),
}

impl ElementSource {
    /// Streams in precedence order
    pub fn streams(&self) -> &[StreamQuery] {
        match self {
            ElementSource::Merge { merge } => merge,
            ElementSource::Single(query) => std::slice::from_ref(query),
        }
    }
}

/// One named output field
///
/// On the wire exactly one of `stream` or `merge` must be present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetQueryElement {
    /// Stream or merge list
    #[serde(flatten)]
    pub source: ElementSource,

    /// Registered interpolator name
    pub interpolator: String,
}

impl DatasetQueryElement {
    /// Element backed by a single stream
    pub fn single(query: StreamQuery, interpolator: impl Into<String>) -> Self {
        Self {
            source: ElementSource::Single(query),
            interpolator: interpolator.into(),
        }
    }

    /// Element backed by a merge of streams
    pub fn merge(queries: Vec<StreamQuery>, interpolator: impl Into<String>) -> Self {
        Self {
            source: ElementSource::Merge { merge: queries },
            interpolator: interpolator.into(),
        }
    }

    /// Streams this element reads, in precedence order
    pub fn streams(&self) -> &[StreamQuery] {
        self.source.streams()
    }
}

/// Wire shape of an element before the source form is checked
#[derive(Deserialize)]
struct RawElement {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    t1: f64,
    #[serde(default)]
    t2: f64,
    #[serde(default)]
    merge: Option<Vec<StreamQuery>>,
    interpolator: String,
}

impl<'de> Deserialize<'de> for DatasetQueryElement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawElement::deserialize(deserializer)?;
        let source = match (raw.stream, raw.merge) {
            (Some(stream), None) => ElementSource::Single(StreamQuery {
                stream,
                t1: raw.t1,
                t2: raw.t2,
            }),
            (None, Some(merge)) => ElementSource::Merge { merge },
            (Some(_), Some(_)) => {
                return Err(de::Error::custom(
                    "element must not set both 'stream' and 'merge'",
                ))
            }
            (None, None) => {
                return Err(de::Error::custom(
                    "element must set either 'stream' or 'merge'",
                ))
            }
        };

        Ok(Self {
            source,
            interpolator: raw.interpolator,
        })
    }
}

// ============================================================================
// Dataset Query
// ============================================================================

/// A complete dataset request
///
/// `dataset` is ordered by field name, which fixes both the order validation
/// visits elements in and the key order of assembled rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetQuery {
    /// Primary stream and the timeline bounds
    #[serde(flatten)]
    pub primary: StreamQuery,

    /// Output fields
    #[serde(default)]
    pub dataset: BTreeMap<String, DatasetQueryElement>,

    /// Grid step (`0.0` = no grid)
    #[serde(default)]
    pub dt: f64,

    /// Expression reducing each row to a scalar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_transform: Option<String>,
}

impl DatasetQuery {
    /// Event-driven query over a primary stream
    pub fn event(primary: StreamQuery) -> Self {
        Self {
            primary,
            ..Self::default()
        }
    }

    /// Grid-driven query on `t1, t1+dt, ...` below `t2`
    pub fn grid(t1: f64, t2: f64, dt: f64) -> Self {
        Self {
            primary: StreamQuery::default().with_window(t1, t2),
            dt,
            ..Self::default()
        }
    }

    /// Add or replace an output field
    pub fn with_element(mut self, name: impl Into<String>, element: DatasetQueryElement) -> Self {
        self.dataset.insert(name.into(), element);
        self
    }

    /// Set the post-transform expression
    pub fn with_post_transform(mut self, expression: impl Into<String>) -> Self {
        self.post_transform = Some(expression.into());
        self
    }

    /// Whether the timeline is generated from `dt` rather than a primary stream
    pub fn is_grid(&self) -> bool {
        self.primary.stream.is_empty()
    }

    /// The post-transform, treating a blank expression as unset
    pub fn transform_expression(&self) -> Option<&str> {
        self.post_transform
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Every stream the query touches: the primary (if any), then each
    /// element's streams in field order
    pub fn referenced_streams(&self) -> impl Iterator<Item = &StreamQuery> {
        let primary = (!self.is_grid()).then_some(&self.primary);
        primary
            .into_iter()
            .chain(self.dataset.values().flat_map(|e| e.streams().iter()))
    }

    /// Validate and execute with the default engine
    ///
    /// Validation errors are returned before any reader is opened. On success
    /// the caller owns the returned sequence and must close it (dropping it
    /// also closes it).
    pub fn run(&self, accessor: &dyn StreamAccessor) -> QueryResult<DatasetReader> {
        DatasetEngine::default().run(self, accessor)
    }
}
