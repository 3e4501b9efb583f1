//! # Error Types
//!
//! Custom error types for Drone Ingest using `thiserror`.

use thiserror::Error;

/// Main error type for Drone Ingest
#[derive(Debug, Error)]
pub enum IngestError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage-layer errors that are not plain I/O failures
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for Drone Ingest
pub type Result<T> = std::result::Result<T, IngestError>;
