//! Handler errors and their JSON responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use creo_core::store::StoreError;
use creo_core::EngineError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Reported as `{"error": message, "details": details}`.
    #[error("{message}: {details}")]
    Internal { message: String, details: String },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AppError::Internal {
            message: message.into(),
            details: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::BadRequest(message) | AppError::NotFound(message) => {
                json!({ "error": message })
            }
            AppError::Internal { message, details } => {
                tracing::error!(error = %message, details = %details, "request failed");
                json!({ "error": message, "details": details })
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        if err.is_input_error() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::internal("Document generation failed", err)
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound("File not found".into()),
            other => AppError::internal("Database operation failed", other),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::internal("Generation task failed", err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal("File operation failed", err)
    }
}

pub type AppResult<T> = Result<T, AppError>;
