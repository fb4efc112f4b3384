//! Error types shared across Folio crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, FolioError>;

/// Errors raised by the shared utilities
#[derive(Error, Debug)]
pub enum FolioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
