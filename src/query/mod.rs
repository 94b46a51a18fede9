//! Dataset query engine
//!
//! Builds tabular datasets from time-series streams sampled at different,
//! irregular timestamps by aligning them onto one timeline.
//!
//! # Architecture
//!
//! ```text
//! DatasetQuery
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Validate   │  structure, stream existence, interpolator names
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Timeline   │  primary stream (event) or t1 + i*dt (grid)
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Merge     │  per element: k-way merge into a candidate sequence
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Assemble   │  per row: interpolate every element at t
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │ Transform   │  optional row -> scalar expression
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tsdataset::engine::DatapointReader;
//! use tsdataset::query::{DatasetQuery, DatasetQueryElement, StreamQuery};
//! use tsdataset::storage::InMemoryStreamAccessor;
//! use tsdataset::types::Datapoint;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStreamAccessor::new();
//! store.insert("a/b/c", vec![Datapoint::new(1.0, json!(1)), Datapoint::new(2.0, json!(2))])?;
//! store.insert("d/e/f", vec![Datapoint::new(1.1, json!("a")), Datapoint::new(2.1, json!("b"))])?;
//!
//! let query = DatasetQuery::event(StreamQuery::new("a/b/c"))
//!     .with_element("y", DatasetQueryElement::single(StreamQuery::new("d/e/f"), "closest"));
//!
//! let rows = query.run(&store)?.read_all()?;
//! assert_eq!(rows[1].data, json!({"x": 2, "y": "b"}));
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod interpolator;
pub mod merge;
pub mod timeline;
pub mod validate;

// Re-export main types
pub use ast::{DatasetQuery, DatasetQueryElement, ElementSource, StreamQuery};
pub use dataset::{DatasetReader, PostTransform, ResolvedElement};
pub use error::{QueryError, QueryErrorKind, QueryResult};
pub use executor::DatasetEngine;
pub use interpolator::{
    AfterInterpolator, BeforeInterpolator, ClosestInterpolator, Interpolator, InterpolatorRegistry,
};
pub use merge::{CandidateSequence, StreamMerger};
pub use timeline::{GridTimeline, Timeline, TimelineEntry};
pub use validate::QueryValidator;
