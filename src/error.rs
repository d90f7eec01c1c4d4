//! Error taxonomy and HTTP response mapping.
//!
//! Handlers return `Result<Response>`; every variant maps to a status code and a
//! JSON `{"error": "..."}` body. Database and upstream failures are logged with
//! their full detail server-side and surface to the client as a generic 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid request fields.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing/invalid/expired token, or a failed password check.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid identity, but the record belongs to a different doctor.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique-constraint violation surfaced as a client error.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage or ML server call failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Database(_) | Error::Upstream(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            Error::BadRequest(msg)
            | Error::Unauthorized(msg)
            | Error::Forbidden(msg)
            | Error::NotFound(msg)
            | Error::Conflict(msg) => msg.clone(),
            Error::Database(e) => {
                tracing::error!(error = %e, "Database error");
                "Internal server error".to_string()
            }
            Error::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream service error");
                "Failed to process the request".to_string()
            }
            Error::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                "Internal server error".to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Map a unique-constraint violation onto a domain `Conflict`, leaving every
/// other database error untouched.
pub fn map_unique_violation(err: sqlx::Error, conflict_message: &str) -> Error {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return Error::Conflict(conflict_message.to_string());
        }
    }
    Error::Database(err)
}
