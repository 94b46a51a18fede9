//! Stream storage backends
//!
//! Durable storage lives outside this crate. What ships here is the in-memory
//! store used by the server binary, tests and benchmarks.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tsdataset::engine::StreamAccessor;
//! use tsdataset::storage::InMemoryStreamAccessor;
//! use tsdataset::types::Datapoint;
//!
//! # fn main() -> tsdataset::Result<()> {
//! let store = InMemoryStreamAccessor::new();
//! store.insert("alice/phone/steps", vec![Datapoint::new(1.0, json!(120))])?;
//! assert!(store.exists("alice/phone/steps"));
//! # Ok(())
//! # }
//! ```

/// Process-memory stream store
pub mod memory;

pub use memory::{validate_stream_path, AccessorStats, InMemoryStreamAccessor};
