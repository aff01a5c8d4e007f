//! Durable store error types.

use thiserror::Error;

/// Result type for durable backend operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable backend failures. Never escape the store layer.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
