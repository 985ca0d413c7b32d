//! Error types for the tally relevance engine.

use thiserror::Error;

/// Result type alias using tally's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tally operations.
///
/// Only configuration-time failures surface here. Per-fact evaluation never
/// errors: malformed queries evaluate to `false` and malformed facts yield
/// an empty result with a warning.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (invalid knob value, invalid counter entry)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter catalogue error (missing absolute path, invalid entry)
    #[error("Catalogue error: {0}")]
    Catalogue(String),

    /// Field-name map error (compact mode with unmapped long names)
    #[error("Name map error: {0}")]
    NameMap(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
