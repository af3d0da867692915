use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The unique column a registration collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Email,
    Username,
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictField::Email => f.write_str("Email"),
            ConflictField::Username => f.write_str("Username"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Access token required")]
    Missing,
    #[error("Invalid token")]
    Invalid,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} already exists")]
    Conflict(ConflictField),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Endpoint not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::InvalidCredentials => {
                StatusCode::BAD_REQUEST
            }
            AppError::Auth(AuthError::Missing) => StatusCode::UNAUTHORIZED,
            AppError::Auth(AuthError::Invalid) => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!("Request failed: {:#?}", &self);
                "Internal server error".to_string()
            }
            AppError::Validation(_) | AppError::Conflict(_) => {
                tracing::info!("Bad request: {}", &self);
                self.to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}
