//! Error types for the admission crate.
//!
//! Admission decisions never fail; these errors only surface from cold paths such as
//! loading configuration or validating a key up front.

use thiserror::Error;

/// Main error type for admission operations.
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit key that is empty or whitespace only
    #[error("Invalid rate limit key: must contain non-whitespace characters")]
    InvalidKey,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for admission operations.
pub type Result<T> = std::result::Result<T, AdmissionError>;
