//! HTTP error type.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::submit::SubmitError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// 400
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// 422, content flagged toxic
    #[error("Content rejected by moderation")]
    Rejected { score: f64 },

    /// 500
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Rejected { score } => Self::Rejected { score },
            SubmitError::Invalid(msg) => Self::BadRequest(msg),
            SubmitError::Unexpected(e) => Self::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Rejected { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "MODERATION_REJECTED",
                "Too toxic! Tone it down.".to_string(),
            ),
            ApiError::Internal(ref err) => {
                error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Something went wrong".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
