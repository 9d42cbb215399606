//! Error types for the admin dashboard.

use thiserror::Error;

/// Result type for admin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving admin commands.
#[derive(Debug, Error)]
pub enum Error {
    /// Sync engine error
    #[error(transparent)]
    Sync(#[from] matukana_sync::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed command line
    #[error("Invalid command: {0}")]
    Command(String),

    /// Bad environment or seed file
    #[error("Invalid configuration: {0}")]
    Config(String),
}
