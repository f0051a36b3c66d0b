use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by the extender's HTTP handlers, mapped to the taxonomy
/// kinds from the error handling design: infeasibility is never fatal,
/// stale/transient orchestrator errors map to 409/504, everything else is
/// a 500 with a logged cause.
#[derive(Debug)]
pub enum ApiError {
    /// No feasible placement for this pod on this node. Never fatal.
    Infeasible(String),

    /// The named node/pod isn't known to the cache.
    NotFound(String),

    /// Optimistic-concurrency conflict surfaced after the retry budget was
    /// exhausted.
    Conflict(String),

    /// Request body failed to parse or was missing a required field.
    BadRequest(String),

    /// Orchestrator I/O failure or any other unexpected condition.
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Infeasible(msg) => (StatusCode::OK, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

impl From<cardpool_cache::CacheError> for ApiError {
    fn from(err: cardpool_cache::CacheError) -> Self {
        use cardpool_cache::CacheError;

        match err {
            CacheError::NodeUnavailable { .. } => ApiError::NotFound(err.to_string()),
            CacheError::PodUidMismatch { .. } => ApiError::Conflict(err.to_string()),
            CacheError::Client(client_err) => client_err.into(),
            CacheError::Allocator(alloc_err) => alloc_err.into(),
        }
    }
}

impl From<cardpool_allocator::AllocatorError> for ApiError {
    fn from(err: cardpool_allocator::AllocatorError) -> Self {
        use cardpool_allocator::AllocatorError;

        match err {
            AllocatorError::Infeasible { .. } => ApiError::Infeasible(err.to_string()),
            AllocatorError::UnknownPod { .. } | AllocatorError::NoCachedPlan { .. } => {
                ApiError::NotFound(err.to_string())
            }
            AllocatorError::InvalidPolicy { .. } => ApiError::BadRequest(err.to_string()),
            AllocatorError::InvariantViolation { .. } | AllocatorError::Core(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<cardpool_client::ClientError> for ApiError {
    fn from(err: cardpool_client::ClientError) -> Self {
        use cardpool_client::ClientError;

        match err {
            ClientError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ClientError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            ClientError::Timeout { .. } | ClientError::Io { .. } | ClientError::Core(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}
