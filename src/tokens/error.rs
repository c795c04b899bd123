//! Token store error types

use thiserror::Error;

/// Errors that can occur while persisting tokens
#[derive(Error, Debug)]
pub enum TokenStoreError {
    /// Reading or writing a backing file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing file held something other than the expected JSON
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TokenStoreError {
    fn from(err: serde_json::Error) -> Self {
        TokenStoreError::Serialization(err.to_string())
    }
}

/// Result type for token store operations
pub type TokenStoreResult<T> = Result<T, TokenStoreError>;
