//! Request-level error type shared by all services.
//!
//! Per-server probe failures are not `AppError`s: they are folded into the
//! catalog response. `AppError` covers request-shape problems and failures of
//! the service's own infrastructure (registry database, cache store).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across services.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request body failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// None of the requested servers exist or are active.
    #[error("no active servers found for ids: {0}")]
    NoActiveServers(String),

    /// Could not reach the registry database.
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// A registry query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(String),

    /// Could not reach the cache store.
    #[error("redis connection failed: {0}")]
    RedisConnection(String),

    /// A cache store command failed.
    #[error("redis operation failed: {0}")]
    RedisOperation(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NoActiveServers(_) => "NOT_FOUND",
            AppError::DatabaseConnection(_) | AppError::DatabaseQuery(_) => "DATABASE_ERROR",
            AppError::RedisConnection(_) | AppError::RedisOperation(_) => "CACHE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NoActiveServers(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseConnection(_) | AppError::RedisConnection(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
