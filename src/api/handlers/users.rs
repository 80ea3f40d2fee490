use super::require_auth;
use crate::{
    auth::{AuthService, ErrorBody},
    model::User,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "The authenticated user", body = User),
        (status = 401, description = "Missing, revoked or expired token", body = ErrorBody),
        (status = 404, description = "User no longer exists", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip(auth, headers))]
pub async fn me(auth: Extension<Arc<AuthService>>, headers: HeaderMap) -> Response {
    let principal = match require_auth(&headers, &auth).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match auth.current_user(&principal).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}
