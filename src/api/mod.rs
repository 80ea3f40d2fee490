use crate::{
    api::handlers::{
        rate_limit::{limit_requests, RateLimit},
        root,
    },
    auth::AuthService,
    gatekeeper::{require_api_key, Gatekeeper},
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::get,
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use handlers::require_auth;
pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// HTTP-layer settings that do not belong to any single component.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Requests per client per minute; `0` disables limiting.
    pub rate_limit_per_minute: u64,
    /// Deadline for a whole request, including store, cache and verifier calls.
    pub request_timeout: Duration,
    /// Key the rate limiter on `X-Forwarded-For` / `X-Real-IP` instead of the
    /// peer address. Only safe behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 0,
            request_timeout: Duration::from_secs(30),
            trust_proxy_headers: false,
        }
    }
}

/// Assemble the application: documented routes, `/`, shared state and
/// middleware. Requests pass request-id, tracing and timeout layers first,
/// then the rate limiter, then the gatekeeper, then the route.
#[must_use]
pub fn app(
    auth: Arc<AuthService>,
    gatekeeper: Option<Arc<Gatekeeper>>,
    options: &ServerOptions,
) -> Router {
    let (router, _openapi) = router().split_for_parts();
    let mut app = router.route("/", get(root::root));

    if let Some(gatekeeper) = gatekeeper {
        app = app.layer(middleware::from_fn_with_state(gatekeeper, require_api_key));
    }

    if options.rate_limit_per_minute > 0 {
        app = app.layer(middleware::from_fn_with_state(
            RateLimit::new(
                auth.clone(),
                options.rate_limit_per_minute,
                options.trust_proxy_headers,
            ),
            limit_requests,
        ));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(TimeoutLayer::new(options.request_timeout))
            .layer(Extension(auth)),
    )
}

/// Serve `app` on `[::]:port` until SIGINT or SIGTERM.
///
/// # Errors
/// Return error if the listener cannot be bound or the server fails.
pub async fn serve(port: u16, app: Router) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gracefully shutdown");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
