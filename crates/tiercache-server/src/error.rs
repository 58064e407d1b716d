//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tiercache::CacheError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A revalidation failed; the cause is logged, never returned.
    #[error("Failed to revalidate")]
    Revalidation(#[source] CacheError),

    #[error("Cache operation failed")]
    Cache(#[source] CacheError),
}

impl ApiError {
    /// Classify a failed revalidation: bad tags are the caller's fault.
    pub fn revalidation(err: CacheError) -> Self {
        match err {
            CacheError::InvalidTag { message } => Self::BadRequest(message),
            other => Self::Revalidation(other),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidTag { message } => Self::BadRequest(message),
            other => Self::Cache(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Revalidation(source) | ApiError::Cache(source) => {
                tracing::error!(error = %source, "{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_detail_is_not_exposed() {
        let err = ApiError::revalidation(CacheError::BackendNotReady {
            message: "redis://secret@host refused".to_string(),
        });
        assert_eq!(err.to_string(), "Failed to revalidate");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_tag_is_a_client_error() {
        let err = ApiError::revalidation(CacheError::InvalidTag {
            message: "tag must not be empty".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
