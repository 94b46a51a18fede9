//! Query error types
//!
//! Provides structured error handling for dataset queries. Validation kinds are
//! raised by `Run` before any stream is read; execution kinds surface while the
//! caller pulls rows from the output sequence.

use std::fmt;

/// Query error with context
#[derive(Debug)]
pub struct QueryError {
    /// Error kind for programmatic handling
    pub kind: QueryErrorKind,
    /// Human-readable message
    pub message: String,
    /// Optional source error
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl QueryError {
    /// Create a new query error
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add source error for error chaining
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The dataset has no elements
    pub fn empty_dataset() -> Self {
        Self::new(
            QueryErrorKind::EmptyDataset,
            "dataset must contain at least one element",
        )
    }

    /// A dataset element uses the reserved primary field name
    pub fn reserved_field(name: &str) -> Self {
        Self::new(
            QueryErrorKind::ReservedFieldName,
            format!("field name '{}' is reserved for the primary stream", name),
        )
    }

    /// Neither a primary stream nor a valid grid was given
    pub fn no_timeline(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::NoTimeline, message)
    }

    /// A referenced stream does not exist
    pub fn stream_not_found(path: &str) -> Self {
        Self::new(
            QueryErrorKind::StreamNotFound,
            format!("stream '{}' not found", path),
        )
    }

    /// An interpolator name is not registered
    pub fn unknown_interpolator(field: &str, name: &str) -> Self {
        Self::new(
            QueryErrorKind::UnknownInterpolator,
            format!("field '{}': unknown interpolator '{}'", field, name),
        )
    }

    /// The post-transform failed for a row
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::EvaluationError, message)
    }

    /// An interpolator was asked to search an empty candidate sequence
    pub fn empty_candidates(field: &str) -> Self {
        Self::new(
            QueryErrorKind::EmptyCandidateSequence,
            format!("field '{}' has no datapoints to interpolate from", field),
        )
    }

    /// Create a resource limit error
    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ResourceLimit, message)
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Storage, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Internal, message)
    }

    /// Whether this error was raised before any output was produced
    pub fn is_validation(&self) -> bool {
        self.kind.is_validation()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Categories of query errors for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    /// The dataset mapping is empty
    EmptyDataset,
    /// A dataset key collides with the primary field name
    ReservedFieldName,
    /// No primary stream and no usable grid (`dt > 0`, `t1 < t2`)
    NoTimeline,
    /// A referenced stream path does not exist
    StreamNotFound,
    /// An interpolator name is not registered
    UnknownInterpolator,
    /// The grid would produce more rows than allowed
    ResourceLimit,
    /// Post-transform parse or evaluation failure
    EvaluationError,
    /// A dataset element resolved to zero candidate datapoints
    EmptyCandidateSequence,
    /// The stream accessor failed while fetching
    Storage,
    /// Internal error (bug, misuse of a closed sequence)
    Internal,
}

impl QueryErrorKind {
    /// Kinds detected by validation, before output production begins
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            QueryErrorKind::EmptyDataset
                | QueryErrorKind::ReservedFieldName
                | QueryErrorKind::NoTimeline
                | QueryErrorKind::StreamNotFound
                | QueryErrorKind::UnknownInterpolator
                | QueryErrorKind::ResourceLimit
        )
    }

    /// Stable label used for logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            QueryErrorKind::EmptyDataset => "EmptyDataset",
            QueryErrorKind::ReservedFieldName => "ReservedFieldName",
            QueryErrorKind::NoTimeline => "NoTimeline",
            QueryErrorKind::StreamNotFound => "StreamNotFound",
            QueryErrorKind::UnknownInterpolator => "UnknownInterpolator",
            QueryErrorKind::ResourceLimit => "ResourceLimit",
            QueryErrorKind::EvaluationError => "EvaluationError",
            QueryErrorKind::EmptyCandidateSequence => "EmptyCandidateSequence",
            QueryErrorKind::Storage => "Storage",
            QueryErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for query operations
pub type QueryResult<T> = std::result::Result<T, QueryError>;
