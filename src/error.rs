//! Error types for data collection operations

use thiserror::Error;

/// Main error type for data collection operations
#[derive(Error, Debug)]
pub enum DcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error reading required attribute : {0}")]
    MissingAttribute(String),

    #[error("Invalid attribute value : {0}")]
    InvalidAttribute(String),

    #[error("Missing dimension: {0}")]
    MissingDimension(String),

    #[error("Unsupported MAP_PROJ value : {0}")]
    UnsupportedProjection(i64),

    #[error("Invalid coordinate variable : {0}")]
    InvalidCoordinateVariable(String),

    #[error("Time step out of range : {ts} (collection has {count} time steps)")]
    TimeStepOutOfRange { ts: usize, count: usize },

    #[error("Invalid file descriptor : {0}")]
    InvalidHandle(u64),

    #[error("Malformed time string: {0}")]
    MalformedTime(String),

    #[error("Not yet supported: {0}")]
    Unsupported(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Specialized Result type for data collection operations
pub type Result<T> = std::result::Result<T, DcError>;

impl From<serde_json::Error> for DcError {
    fn from(err: serde_json::Error) -> Self {
        DcError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DcError {
    fn from(err: ndarray::ShapeError) -> Self {
        DcError::InvalidDimensions(err.to_string())
    }
}
