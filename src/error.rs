use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

/// AppError
///
/// The application-wide failure taxonomy. Every fallible operation below the
/// routing layer returns this type, and the `IntoResponse` impl maps each
/// variant to the HTTP status the client is expected to see:
///
/// - `Validation`: malformed form input or a reference to a missing row,
///   reported per field so the caller can re-render the form (422).
/// - `Conflict`: a uniqueness violation or a delete blocked by the restrict
///   policy (409).
/// - `NotFound`: unknown entity slug or row id (404).
/// - `InvalidCredentials`: a failed login or registration-session attempt.
///   The body is deliberately generic and identical for "unknown email" and
///   "wrong password" (401).
/// - `Database` / `Session`: infrastructure failures. Logged with detail,
///   reported to the client as an opaque 500.
///
/// Authorization failures are *not* represented here: the access gate rejects
/// with a redirect (see `auth::AuthRedirect`), never an error page.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(BTreeMap<String, String>),

    #[error("{0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),
}

impl AppError {
    /// Convenience constructor for a single-field validation failure.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.to_string());
        AppError::Validation(fields)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "validation failed", "fields": fields })),
            )
                .into_response(),
            AppError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
            }
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not found" })),
            )
                .into_response(),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid credentials" })),
            )
                .into_response(),
            AppError::Database(e) => {
                // Full detail goes to the log only. The client gets an opaque body.
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
            AppError::Session(e) => {
                tracing::error!("session error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}
