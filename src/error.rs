//! Request-level error type and its HTTP mapping.
//!
//! Client mistakes (`InvalidInput`, `NotFound`) carry a human-readable
//! reason back to the caller. Server-side failures are logged with their
//! cause and answered with a generic message only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

// ---

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ---
    /// Rejected before any query runs.
    #[error("{0}")]
    InvalidInput(String),

    /// A valid selection that matched no data where data is required.
    #[error("{0}")]
    NotFound(String),

    /// The request exceeded the configured query deadline.
    #[error("request timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("report rendering failed: {0}")]
    Report(#[from] csv::Error),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl AppError {
    // ---
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(e) if is_statement_timeout(e) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_) | AppError::Report(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// PostgreSQL `query_canceled` (57014), raised when `statement_timeout` fires.
fn is_statement_timeout(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "57014")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();
        let detail = match &self {
            AppError::InvalidInput(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Timeout => {
                tracing::warn!("Request exceeded query deadline");
                self.to_string()
            }
            AppError::Database(e) if is_statement_timeout(e) => {
                tracing::warn!(error = %e, "Statement cancelled by server-side timeout");
                AppError::Timeout.to_string()
            }
            AppError::Database(_) | AppError::Report(_) => {
                tracing::error!(error = %self, "Request failed");
                "internal server error".to_string()
            }
        };

        (status, Json(ErrorBody { detail: &detail })).into_response()
    }
}
