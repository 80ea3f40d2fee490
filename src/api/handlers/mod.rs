//! API handlers and shared request helpers.

pub mod auth;
pub mod health;
pub mod rate_limit;
pub mod root;
pub mod users;

use crate::auth::{AuthError, AuthService, Principal};
use axum::http::{header::AUTHORIZATION, HeaderMap};

/// Resolve the bearer token in `Authorization` into a principal.
///
/// # Errors
/// `AuthError::InvalidToken` when the header is missing or the token is not
/// honoured; `AuthError::Cache` when the session cache cannot be read.
pub async fn require_auth(headers: &HeaderMap, auth: &AuthService) -> Result<Principal, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::InvalidToken)?;
    auth.authenticate(value).await
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
