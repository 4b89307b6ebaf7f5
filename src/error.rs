//! HTTP-facing error type

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::log_error;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServerError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) | Self::Store(StoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            Self::Store(StoreError::InvalidName(_)) => (StatusCode::BAD_REQUEST, "INVALID_NAME"),
            Self::Store(StoreError::Stale(_)) => (StatusCode::CONFLICT, "STALE_SCHEMA"),
            Self::Store(
                StoreError::Io { .. } | StoreError::Encode { .. } | StoreError::Decode { .. },
            ) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            log_error!("{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
