//! Error taxonomy and the normalizer that turns any failure into a response envelope.

use std::collections::BTreeMap;

use axum::http::StatusCode;

use crate::response::{ActionResponse, ErrorBody};

/// Field name (camelCase, as the client sent it) to human-readable messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failures raised by a document store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("duplicate value for unique field `{field}` in `{collection}`")]
    Duplicate { collection: String, field: String },

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unknown collection `{0}`")]
    UnknownCollection(String),

    #[error("database connection is closed")]
    Closed,
}

/// Credential and session failures. Messages stay generic so callers
/// cannot probe which accounts exist.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists")]
    AlreadyExists,

    #[error("invalid or expired token")]
    InvalidToken,
}

/// Service-level error every operation resolves to before normalization.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// A validation failure carrying a single field message.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Auth(AuthError::AlreadyExists) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Map any error to the uniform `{ success: false, error }` envelope.
///
/// Validation errors keep their per-field detail. Store and internal
/// failures are logged in full and reported with a generic message.
pub fn handle_error<T>(err: AppError) -> ActionResponse<T> {
    let status = err.status();
    let body = match err {
        AppError::Validation(details) => ErrorBody {
            message: "Validation failed".to_string(),
            details: Some(details),
        },
        AppError::NotFound(label) => ErrorBody::message(format!("{label} not found")),
        AppError::Unauthorized => ErrorBody::message("Unauthorized"),
        AppError::Auth(AuthError::InvalidCredentials) => ErrorBody::message("Invalid credentials"),
        AppError::Auth(AuthError::AlreadyExists) => ErrorBody::message("User already exists"),
        AppError::Auth(AuthError::InvalidToken) => ErrorBody::message("Invalid or expired token"),
        AppError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            ErrorBody::message("An unexpected error occurred")
        }
        AppError::Internal(msg) => {
            tracing::error!(error = %msg, "internal failure");
            ErrorBody::message("An unexpected error occurred")
        }
    };

    ActionResponse::failure(status, body)
}
