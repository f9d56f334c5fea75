//! API error type
//!
//! Every failure leaves the server as `{success: false, error, code}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::types::RfpError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, Error)]
#[error("[{status}] [{code}] {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, "NOT_FOUND")
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, "VALIDATION_ERROR")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR")
    }
}

impl From<RfpError> for ApiError {
    fn from(err: RfpError) -> Self {
        match &err {
            RfpError::RunAlreadyActive { .. } => {
                Self::new(StatusCode::CONFLICT, err.to_string(), "RUN_ALREADY_ACTIVE")
            }
            RfpError::InvalidSelection(_) => Self::validation(err.to_string()),
            RfpError::NotFound { .. } => Self::not_found(err.to_string()),
            e if e.is_persistence_fault() => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                err.to_string(),
                "PERSISTENCE_UNAVAILABLE",
            ),
            _ => {
                tracing::error!("Request failed: {}", err);
                Self::internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        }));
        (self.status, body).into_response()
    }
}
