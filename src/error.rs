//! Error types for the Flipbook server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::viewer::{PageRenderError, ShellError};

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Page(#[from] PageRenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Shell(e) => {
                let error_type = match e {
                    ShellError::Validation(_) => "invalid_source",
                    ShellError::Unreachable(_) => "unreachable_source",
                };
                (StatusCode::UNPROCESSABLE_ENTITY, error_type, e.to_string())
            }
            AppError::Page(e) => match e {
                PageRenderError::NoDocument | PageRenderError::OutOfRange { .. } => {
                    (StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                PageRenderError::Render { .. } => {
                    tracing::warn!("Page render error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "render_error", e.to_string())
                }
            },
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "io_error",
                    "IO error".to_string(),
                )
            }
        };

        let details = match &self {
            AppError::Shell(ShellError::Unreachable(e)) => Some(e.detail.clone()),
            _ if cfg!(debug_assertions) => Some(self.to_string()),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}
