//! Error types for the streaming PDF reduction
//!
//! Provides a unified error type for all streampdf crates.

use thiserror::Error;

/// Core error type for stream-analysis operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter provided to a function
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A field's dimensionality differs from what the reduction requires
    #[error("Shape error: expected {expected} dimensions, got {actual}")]
    Shape { expected: usize, actual: usize },

    /// Stream protocol violation or engine failure
    #[error("Stream error: {0}")]
    Stream(String),

    /// The not-ready retry budget was exhausted
    #[error("Stream timed out: {0}")]
    StreamTimeout(String),

    /// The operation was cancelled via a cancellation token
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Step-record serialization error (file engine)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file engine, step records)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

// Helper functions for common error patterns

impl Error {
    /// Create an error for a field that is not 3-dimensional
    pub fn bad_rank(actual: usize) -> Self {
        Self::Shape {
            expected: 3,
            actual,
        }
    }

    /// Create an error for a size mismatch between a buffer and a selection
    pub fn size_mismatch(expected: usize, actual: usize, context: &str) -> Self {
        Self::InvalidInput(format!(
            "Size mismatch in {context}: expected {expected}, got {actual}"
        ))
    }

    /// Create an error for an unknown stream variable
    pub fn unknown_variable(name: &str) -> Self {
        Self::Stream(format!("variable '{name}' is not present in the stream"))
    }

    /// Create an error for a shape that changed between steps
    pub fn shape_drift(name: &str, first: &[usize], now: &[usize]) -> Self {
        Self::InvalidInput(format!(
            "shape of '{name}' changed between steps: {first:?} -> {now:?}"
        ))
    }
}
