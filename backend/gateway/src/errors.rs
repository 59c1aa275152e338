//! Application-wide error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("External service error ({status}): {message}")]
    ExternalService { status: u16, message: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("ABI error: {0}")]
    Abi(#[from] ethers::abi::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing bearer session token")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn external(status: u16, message: impl Into<String>) -> Self {
        Self::ExternalService {
            status,
            message: message.into(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            Self::Config(_) => (StatusCode::BAD_REQUEST, "CONFIGURATION_ERROR"),
            Self::SubmissionFailed(_) => (StatusCode::BAD_GATEWAY, "SUBMISSION_FAILED"),
            Self::ExternalService { .. } => (StatusCode::BAD_GATEWAY, "EXTERNAL_SERVICE_ERROR"),
            Self::Rpc(_) => (StatusCode::BAD_GATEWAY, "RPC_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Abi(_) | Self::Decode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DECODE_ERROR"),
            Self::Database(_) | Self::Migrate(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
            Self::Http(_) | Self::Json(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("{code}: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                code,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_map_to_bad_request() {
        let (status, code) = GatewayError::InvalidAmount("x".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "INVALID_AMOUNT");

        let (status, code) = GatewayError::Config("x".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "CONFIGURATION_ERROR");
    }

    #[test]
    fn upstream_failures_map_to_bad_gateway() {
        let (status, _) = GatewayError::SubmissionFailed("down".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let (status, _) = GatewayError::external(503, "busy").status_and_code();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
