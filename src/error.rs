//! Error types for the forest training job

use thiserror::Error;

/// Result type alias for training operations
pub type Result<T> = std::result::Result<T, ForestError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ForestError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Tracking error: {0}")]
    TrackingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("The prediction method {0} is not supported.")]
    UnsupportedPredictMethod(String),
}

impl From<polars::error::PolarsError> for ForestError {
    fn from(err: polars::error::PolarsError) -> Self {
        ForestError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ForestError {
    fn from(err: serde_json::Error) -> Self {
        ForestError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for ForestError {
    fn from(err: bincode::Error) -> Self {
        ForestError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ForestError {
    fn from(err: ndarray::ShapeError) -> Self {
        ForestError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
