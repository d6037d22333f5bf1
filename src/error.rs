use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::dao::DaoLayerError;

/// Service-level failure taxonomy. Validation failures inside `validate_*`
/// never appear here; those are recovered into booleans at the call site.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid or expired password reset challenge")]
    InvalidChallenge,
    /// A revocation upsert failed. Always propagated, never swallowed: a
    /// silently failed revoke leaves compromised sessions alive.
    #[error("Token revocation failed: {0}")]
    Revocation(String),
    #[error("Token signing failed: {0}")]
    Signing(String),
    #[error("Password hashing failed")]
    Hash,
    #[error("Email delivery failed: {0}")]
    Mail(String),
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error(transparent)]
    Dao(#[from] DaoLayerError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidToken => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidChallenge | ServiceError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Mail(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Revocation(_) | ServiceError::Signing(_) | ServiceError::Hash => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Dao(DaoLayerError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Dao(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}
