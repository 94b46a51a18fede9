//! Pluggable engine architecture for stream access
//!
//! The query engine is generic over how streams are stored. Anything that can
//! answer "does this path exist" and "give me its datapoints in a window"
//! can back a dataset query.

pub mod traits;

pub use traits::{DatapointReader, StreamAccessor, VecReader};
