//! Request and Response Types for the tsdataset HTTP Server
//!
//! The dataset endpoint takes a `DatasetQuery` body directly and answers with
//! a JSON array of datapoints, so only the auxiliary shapes live here.

use serde::Serialize;

// =============================================================================
// Health & Catalog Types
// =============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Streams currently held by the store
    pub streams: usize,
}

/// One entry of the stream listing
#[derive(Debug, Serialize)]
pub struct StreamInfo {
    pub path: String,
    pub datapoints: usize,
}

/// Stream listing response
#[derive(Debug, Serialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamInfo>,
}

// =============================================================================
// Error Types
// =============================================================================

/// Error body returned with every non-2xx status
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    /// Query error kind, when the failure came from the dataset engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub error: String,
}

impl ErrorResponse {
    /// Error without a query kind (malformed body, internal failures)
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: "error",
            kind: None,
            error: error.into(),
        }
    }

    /// Error tagged with a query error kind
    pub fn with_kind(kind: &'static str, error: impl Into<String>) -> Self {
        Self {
            status: "error",
            kind: Some(kind),
            error: error.into(),
        }
    }
}
