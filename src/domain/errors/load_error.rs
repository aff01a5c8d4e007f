//! Load pipeline error types.

use thiserror::Error;

/// Result type for load operations.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Errors surfaced by the load pipeline.
///
/// `Clone` so a single fetch outcome can be delivered to every deduplicated
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("load aborted")]
    Abort,

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("cache error: {message}")]
    Cache { message: String },

    #[error("image unavailable after escalation: {source_id}: {message}")]
    Unavailable { source_id: String, message: String },
}

impl LoadError {
    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates cache error.
    #[must_use]
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Creates the terminal escalation failure.
    #[must_use]
    pub fn unavailable(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Returns whether the error is an intentional cancellation.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_abort_is_abort() {
        assert!(LoadError::Abort.is_abort());
        assert!(!LoadError::network("HTTP 403").is_abort());
        assert!(!LoadError::unavailable("x", "all layers failed").is_abort());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LoadError::network("HTTP 404").to_string(),
            "network error: HTTP 404"
        );
        assert_eq!(LoadError::Abort.to_string(), "load aborted");
    }
}
