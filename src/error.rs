//! Error types for the crate

use crate::query::error::QueryError;
use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Dataset query error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Stream store error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Expression error
    #[error("Expression error: {0}")]
    Expression(#[from] ExprError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Stream store errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Stream path failed sanitation
    #[error("Invalid stream path: '{0}'")]
    InvalidPath(String),

    /// Datapoints must be appended in non-decreasing timestamp order
    #[error("Out of order timestamp on {path}: {timestamp} after {previous}")]
    OutOfOrder {
        /// Stream path
        path: String,
        /// Last stored timestamp
        previous: f64,
        /// Rejected timestamp
        timestamp: f64,
    },

    /// Timestamp is NaN or infinite
    #[error("Non-finite timestamp on {0}")]
    NonFiniteTimestamp(String),
}

/// Post-transform expression errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    /// Expression text could not be parsed
    #[error("Parse error in '{expression}': {message}")]
    Parse {
        /// The expression source
        expression: String,
        /// What went wrong
        message: String,
    },

    /// Field lookup returned nothing
    #[error("Undefined field '{0}'")]
    UndefinedField(String),

    /// Operator applied to incompatible operand types
    #[error("Type error: cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        /// Operator symbol
        op: String,
        /// Left operand type
        left: String,
        /// Right operand type
        right: String,
    },

    /// Unary operator applied to an incompatible operand
    #[error("Type error: cannot apply '{op}' to {operand}")]
    UnaryTypeMismatch {
        /// Operator symbol
        op: String,
        /// Operand type
        operand: String,
    },

    /// Arithmetic produced a value JSON cannot hold (NaN, infinity)
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
