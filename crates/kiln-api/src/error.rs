use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kiln_core::CoreError;
use kiln_model::ErrorResponse;
use thiserror::Error;

/// Request-level failures; each maps to one HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid Authorization header")]
    Unauthorized,

    #[error("failed to decode request body: {0}")]
    MalformedBody(String),

    #[error("the following environment variables are protected, and cannot be modified: {0:?}")]
    ProtectedKeys(Vec<String>),

    // Same status as ProtectedKeys; kept as its own variant so callers can tell them apart.
    #[error(
        "setting environment variables to null is not permitted on this endpoint, use DELETE instead; null keys: {0:?}"
    )]
    NullValues(Vec<String>),

    #[error("not found: {0:?}")]
    NotFound(String),

    #[error("unsupported method {0:?}")]
    UnsupportedMethod(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::ProtectedKeys(_) | ApiError::NullValues(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProtectedKeys(keys) => ApiError::ProtectedKeys(keys),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Lifecycle failures of the per-job listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket path is {len} bytes long, the limit is {max}: {path}")]
    SocketPathTooLong { path: String, len: usize, max: usize },

    #[error("refusing to replace {path}: not a socket")]
    NotASocket { path: String },

    #[error("job api server is already running")]
    AlreadyRunning,

    #[error("job api server is not running")]
    NotRunning,

    #[error("failed to bind {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("server task failed: {0}")]
    Join(String),
}
