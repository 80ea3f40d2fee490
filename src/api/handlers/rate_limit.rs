//! Per-client request limiting on a fixed one-minute window.
//!
//! Clients are keyed by the peer address. `X-Forwarded-For` / `X-Real-IP` are
//! only consulted when proxy headers are trusted, since any client can set
//! them. If the session cache is unreachable the request is let through: this
//! is an abuse control, not an authorization check.

use super::extract_client_ip;
use crate::auth::AuthService;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::warn;

pub const RATE_LIMITED_MESSAGE: &str = "Too Many Requests";

#[derive(Clone, Debug)]
pub struct RateLimit {
    auth: Arc<AuthService>,
    per_minute: u64,
    trust_proxy_headers: bool,
}

impl RateLimit {
    #[must_use]
    pub fn new(auth: Arc<AuthService>, per_minute: u64, trust_proxy_headers: bool) -> Self {
        Self {
            auth,
            per_minute,
            trust_proxy_headers,
        }
    }
}

fn client_key(request: &Request, trust_proxy_headers: bool) -> String {
    let forwarded = if trust_proxy_headers {
        extract_client_ip(request.headers())
    } else {
        None
    };

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn limit_requests(
    State(limit): State<RateLimit>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request, limit.trust_proxy_headers);

    match limit.auth.count_request(&client).await {
        Ok(count) if count > limit.per_minute => {
            warn!(client = %client, count, "Rate limit exceeded");
            let mut response = (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("60"));
            response
        }
        Ok(_) => next.run(request).await,
        Err(err) => {
            warn!("Rate limit check failed, allowing request: {err}");
            next.run(request).await
        }
    }
}
