//! `/auth/*` endpoints.
//!
//! Malformed JSON is answered with `400 {"error": "Invalid request"}`; every
//! other failure goes through `AuthError`'s response mapping.

use super::require_auth;
use crate::{
    auth::{AuthError, AuthService, ErrorBody, LoginOutcome, Principal},
    model::User,
};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

fn malformed(rejection: &JsonRejection) -> Response {
    debug!("Rejected request body: {rejection}");
    AuthError::InvalidRequest.into_response()
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Malformed or invalid input", body = ErrorBody),
        (status = 409, description = "Email or username already in use", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(auth, payload))]
pub async fn register(
    auth: Extension<Arc<AuthService>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return malformed(&rejection),
    };

    match auth
        .register(&request.username, &request.email, &request.password)
        .await
    {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = LoginOutcome),
        (status = 400, description = "Malformed or invalid input", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Account is not active", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(auth, payload))]
pub async fn login(
    auth: Extension<Arc<AuthService>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return malformed(&rejection),
    };

    match auth.login(&request.email, &request.password).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Token revoked, or nothing to revoke"),
        (status = 500, description = "Revocation could not be recorded", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(auth, headers))]
pub async fn logout(auth: Extension<Arc<AuthService>>, headers: HeaderMap) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match auth.logout(authorization).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Session is active", body = Principal),
        (status = 401, description = "Missing, revoked or expired token", body = ErrorBody),
        (status = 500, description = "Session cache unavailable", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(auth, headers))]
pub async fn session(auth: Extension<Arc<AuthService>>, headers: HeaderMap) -> Response {
    match require_auth(&headers, &auth).await {
        Ok(principal) => (StatusCode::OK, Json(principal)).into_response(),
        Err(err) => err.into_response(),
    }
}
