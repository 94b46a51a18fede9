//! tsdataset - dataset queries over time-series streams
//!
//! This library aligns streams sampled at different, irregular timestamps
//! onto a common timeline:
//! - Event-driven timelines that follow a primary stream
//! - Fixed-step grids for resampling
//! - Multi-stream merges with deterministic tie ordering
//! - Pluggable interpolators (`closest`, `before`, `after`)
//! - Per-row post-transform expressions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod storage;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Dataset query engine: validation, timelines, merging, interpolation
pub mod query;

/// Post-transform expression language
pub mod transform;

// Re-export main types
pub use config::{ApplicationConfig, QueryConfig};
pub use engine::{DatapointReader, StreamAccessor};
pub use error::{Error, Result};
pub use query::{DatasetEngine, DatasetQuery, DatasetQueryElement, StreamQuery};
pub use storage::InMemoryStreamAccessor;
pub use types::{Datapoint, TimeWindow};
