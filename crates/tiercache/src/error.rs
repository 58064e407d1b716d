//! Cache-related error types

use std::sync::Arc;

use thiserror::Error;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store connection is absent or was dropped.
    #[error("Backend not ready: {message}")]
    BackendNotReady { message: String },

    /// A single remote call exceeded its deadline.
    #[error("Operation `{operation}` timed out after {timeout_ms} ms")]
    OperationTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// A stored payload could not be decoded.
    #[error("Malformed cache entry at `{key}`: {message}")]
    MalformedEntry { key: String, message: String },

    /// A raw value exists without its tag-index row.
    #[error("Orphaned cache key: {key}")]
    OrphanedKey { key: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Invalid tag: {message}")]
    InvalidTag { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Shared by every caller that awaited the same failed initialization.
    #[error("Cache initialization failed: {0}")]
    Initialization(Arc<CacheError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn not_ready(message: impl Into<String>) -> Self {
        Self::BackendNotReady {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Whether the error means the connection itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::BackendNotReady { .. } => true,
            Self::Initialization(inner) => inner.is_connection_error(),
            _ => false,
        }
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(err: config::ConfigError) -> Self {
        Self::invalid_config(err.to_string())
    }
}

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_classification() {
        assert!(CacheError::not_ready("gone").is_connection_error());
        assert!(
            CacheError::Initialization(Arc::new(CacheError::not_ready("gone")))
                .is_connection_error()
        );
        assert!(!CacheError::backend("boom").is_connection_error());
        assert!(!CacheError::OperationTimeout {
            operation: "GET",
            timeout_ms: 5
        }
        .is_connection_error());
    }

    #[test]
    fn test_timeout_message() {
        let err = CacheError::OperationTimeout {
            operation: "HSCAN",
            timeout_ms: 5000,
        };
        assert_eq!(err.to_string(), "Operation `HSCAN` timed out after 5000 ms");
    }
}
