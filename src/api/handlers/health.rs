use crate::{auth::AuthService, GIT_COMMIT_HASH};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    cache: String,
}

const fn status_label(healthy: bool) -> &'static str {
    if healthy {
        "ok"
    } else {
        "error"
    }
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Credential store and session cache are healthy", body = [Health]),
        (status = 503, description = "Credential store or session cache is unhealthy", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(auth: Extension<Arc<AuthService>>) -> impl IntoResponse {
    let (database, cache) = auth.dependency_health().await;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status_label(database).to_string(),
        cache: status_label(cache).to_string(),
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    // Create headers using the map method
    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();

            headers.insert("X-App", x_app_header_value);

            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        });

    // Unwrap the headers or provide a default value (empty headers) in case of an error
    let headers = headers.unwrap_or_else(|()| HeaderMap::new());

    if database && cache {
        (StatusCode::OK, headers, Json(health))
    } else {
        debug!(database, cache, "Dependencies are unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, headers, Json(health))
    }
}
