//! Unified error type for the ingest/dispatch core and its HTTP-facing
//! surface (the real-time hub upgrade and the health probe).
//!
//! All other collaborators described in spec §6 (tenant/device CRUD,
//! request-level auth, media tokens) live outside this crate and format
//! their own responses; this module only needs to cover what the core
//! itself can fail with.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};

/// Error kinds the core can surface, per spec §7.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::NotFound(_) => ErrorCode::NotFound,
            CoreError::Conflict(_) => ErrorCode::Conflict,
            CoreError::Invariant(_) => ErrorCode::InvariantViolation,
            CoreError::Unauthorized(_) => ErrorCode::Unauthorized,
            CoreError::Forbidden(_) => ErrorCode::Forbidden,
            CoreError::ValidationError(_) => ErrorCode::ValidationError,
            CoreError::Transient(_) => ErrorCode::Transient,
            CoreError::UpstreamUnavailable(_) => ErrorCode::UpstreamUnavailable,
            CoreError::InternalError(_) => ErrorCode::InternalError,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Invariant(_) => StatusCode::BAD_REQUEST,
            CoreError::Transient(_) | CoreError::UpstreamUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CoreError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Machine-readable error codes for the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    Conflict,
    InvariantViolation,
    Unauthorized,
    Forbidden,
    ValidationError,
    Transient,
    UpstreamUnavailable,
    InternalError,
}

/// `{success: false, error_code, message, details?}` envelope, per spec §6.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = ErrorEnvelope {
            success: false,
            error_code: self.code(),
            message: self.to_string(),
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                CoreError::Conflict(db_err.message().to_string())
            }
            other => CoreError::Transient(other.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_kinds() {
        assert_eq!(
            CoreError::NotFound("x".into()).http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoreError::Conflict("x".into()).http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoreError::ValidationError("x".into()).http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CoreError::Invariant("x".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::Transient("x".into()).http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn error_codes_are_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::InvariantViolation).unwrap();
        assert_eq!(json, "\"INVARIANT_VIOLATION\"");
    }
}
