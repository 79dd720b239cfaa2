//! Error types for the cache-aside coordinator
//!
//! Separates "called it wrong" (validation) from "the system failed"
//! (backend, compute, timeout) using thiserror.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the coordinator and the HTTP surface.
///
/// `Clone` so that one settled computation can hand the same outcome to
/// every caller joined on it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Invalid input: bad namespace, unsupported param, bad URL or TTL
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The key-value backend failed (absorbed by the TTL store)
    #[error("Backend error: {0}")]
    Backend(String),

    /// The wrapped origin computation failed
    #[error("Compute failed: {0}")]
    Compute(Arc<anyhow::Error>),

    /// The caller's deadline elapsed before the computation settled
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Internal failure (panicked computation, type mismatch)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wraps a compute failure so it can be shared between joined callers.
    pub fn compute(err: anyhow::Error) -> Self {
        CacheError::Compute(Arc::new(err))
    }

    /// True for errors caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(self, CacheError::InvalidRequest(_))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Compute(_) => StatusCode::BAD_GATEWAY,
            CacheError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Backend(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the coordinator.
pub type Result<T> = std::result::Result<T, CacheError>;
