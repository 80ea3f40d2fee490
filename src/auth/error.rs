use crate::{cache::CacheError, store::StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// JSON error body returned by every auth endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed request body")]
    InvalidRequest,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("email already registered")]
    DuplicateEmail,
    #[error("username already taken")]
    DuplicateUsername,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is not active")]
    AccountNotActive,
    #[error("invalid or revoked token")]
    InvalidToken,
    #[error("user not found")]
    UserNotFound,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    TokenSigning(String),
    #[error("failed to persist session: {0}")]
    SessionPersistence(CacheError),
    #[error("failed to revoke token: {0}")]
    Revocation(CacheError),
    #[error("failed to persist user: {0}")]
    Persistence(StoreError),
    #[error("credential store error: {0}")]
    Store(StoreError),
    #[error("session cache error: {0}")]
    Cache(CacheError),
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateEmail | Self::DuplicateUsername => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::AccountNotActive => StatusCode::FORBIDDEN,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Hashing(_)
            | Self::TokenSigning(_)
            | Self::SessionPersistence(_)
            | Self::Revocation(_)
            | Self::Persistence(_)
            | Self::Store(_)
            | Self::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Dependency failures never leak their cause.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest => "Invalid request".to_string(),
            Self::Validation(reason) => format!("Invalid request: {reason}"),
            Self::DuplicateEmail => "Email already registered".to_string(),
            Self::DuplicateUsername => "Username already taken".to_string(),
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::AccountNotActive => "Account is not active".to_string(),
            Self::InvalidToken => "Invalid or expired token".to_string(),
            Self::UserNotFound => "User not found".to_string(),
            Self::Hashing(_) => "Failed to process password".to_string(),
            Self::TokenSigning(_) => "Failed to generate token".to_string(),
            Self::SessionPersistence(_) => "Failed to create session".to_string(),
            Self::Revocation(_) => "Failed to logout".to_string(),
            Self::Persistence(_) => "Failed to create user".to_string(),
            Self::Store(_) | Self::Cache(_) => "Database error".to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
