//! Error types for rally-core

use thiserror::Error;

/// Result type alias using rally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rally-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store HTTP transport error
    #[error("Remote HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store rejected a request
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Malformed timestamp in stored or remote data
    #[error("Timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),
}
