//! Request Gatekeeper: API-key admission in front of every route.
//!
//! The key is read from one configured header (default `Authorization`) and
//! checked against an external verification authority. The gate fails closed:
//! if the authority cannot be reached the request is refused with 500.
//! It knows nothing about user sessions.

pub mod unkey;

pub use unkey::UnkeyVerifier;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, error};

pub const MISSING_KEY_MESSAGE: &str = "Unauthorized: No API key provided";
pub const INVALID_KEY_MESSAGE: &str = "Unauthorized: Invalid API key";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Structured answer from the verification authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVerdict {
    Valid,
    Invalid,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("verification service returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait KeyVerifier: Send + Sync {
    /// Ask the authority whether `key` is valid for `api_id`.
    ///
    /// # Errors
    /// Returns an error when no structured verdict could be obtained.
    async fn verify(&self, api_id: &str, key: &str) -> Result<KeyVerdict, VerifyError>;
}

/// Configured gate: verifier, API id and the header carrying the key.
#[derive(Clone)]
pub struct Gatekeeper {
    verifier: Arc<dyn KeyVerifier>,
    api_id: String,
    header: HeaderName,
}

impl fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("api_id", &self.api_id)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    #[must_use]
    pub fn new(verifier: Arc<dyn KeyVerifier>, api_id: String, header: HeaderName) -> Self {
        Self {
            verifier,
            api_id,
            header,
        }
    }

    #[must_use]
    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

/// Middleware: admit the request only with a key the authority accepts.
pub async fn require_api_key(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    request: Request,
    next: Next,
) -> Response {
    // Non-UTF-8 bytes are forwarded lossily; the authority decides validity.
    let key = request
        .headers()
        .get(&gatekeeper.header)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
        .unwrap_or_default();

    if key.is_empty() {
        return (StatusCode::UNAUTHORIZED, MISSING_KEY_MESSAGE).into_response();
    }

    match gatekeeper.verifier.verify(&gatekeeper.api_id, &key).await {
        Ok(KeyVerdict::Valid) => next.run(request).await,
        Ok(KeyVerdict::Invalid) => {
            debug!("Rejected request with invalid API key");
            (StatusCode::UNAUTHORIZED, INVALID_KEY_MESSAGE).into_response()
        }
        Err(err) => {
            error!("Error verifying key: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, HeaderValue},
        middleware,
        routing::get,
        Router,
    };
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use tower::ServiceExt;

    /// Accepts exactly one key; `fail` turns every call into a transport error.
    #[derive(Default)]
    struct FakeVerifier {
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl KeyVerifier for FakeVerifier {
        async fn verify(&self, api_id: &str, key: &str) -> Result<KeyVerdict, VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((api_id.to_string(), key.to_string()));
            }
            if self.fail {
                return Err(VerifyError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(if key == "good-key" {
                KeyVerdict::Valid
            } else {
                KeyVerdict::Invalid
            })
        }
    }

    fn app(verifier: Arc<FakeVerifier>, header: HeaderName) -> Router {
        let gatekeeper = Arc::new(Gatekeeper::new(verifier, "api_123".to_string(), header));
        Router::new()
            .route("/", get(|| async { "Hello, World!" }))
            .layer(middleware::from_fn_with_state(gatekeeper, require_api_key))
    }

    async fn body_text(response: Response) -> Result<String> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    #[tokio::test]
    async fn missing_header_is_rejected_without_calling_out() -> Result<()> {
        let verifier = Arc::new(FakeVerifier::default());
        let response = app(verifier.clone(), AUTHORIZATION)
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await?, MISSING_KEY_MESSAGE);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn valid_key_reaches_handler() -> Result<()> {
        let verifier = Arc::new(FakeVerifier::default());
        let response = app(verifier.clone(), AUTHORIZATION)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(AUTHORIZATION, "good-key")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await?, "Hello, World!");
        let seen = verifier.seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert_eq!(seen, vec![("api_123".to_string(), "good-key".to_string())]);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_key_is_unauthorized() -> Result<()> {
        let verifier = Arc::new(FakeVerifier::default());
        let response = app(verifier, AUTHORIZATION)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(AUTHORIZATION, "bad-key")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await?, INVALID_KEY_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn non_ascii_key_is_left_to_the_authority() -> Result<()> {
        let verifier = Arc::new(FakeVerifier::default());
        let response = app(verifier.clone(), AUTHORIZATION)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(AUTHORIZATION, HeaderValue::from_bytes(b"caf\xe9-key")?)
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await?, INVALID_KEY_MESSAGE);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
        let seen = verifier.seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert_eq!(seen, vec![("api_123".to_string(), "caf\u{fffd}-key".to_string())]);
        Ok(())
    }

    #[tokio::test]
    async fn blank_key_counts_as_missing() -> Result<()> {
        let verifier = Arc::new(FakeVerifier::default());
        let response = app(verifier.clone(), AUTHORIZATION)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(AUTHORIZATION, "   ")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await?, MISSING_KEY_MESSAGE);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn verifier_failure_fails_closed() -> Result<()> {
        let verifier = Arc::new(FakeVerifier {
            fail: true,
            ..FakeVerifier::default()
        });
        let response = app(verifier, AUTHORIZATION)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(AUTHORIZATION, "good-key")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await?, INTERNAL_ERROR_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn custom_header_leaves_authorization_alone() -> Result<()> {
        let verifier = Arc::new(FakeVerifier::default());
        let header = HeaderName::from_static("x-api-key");

        let response = app(verifier.clone(), header.clone())
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(AUTHORIZATION, "good-key")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(verifier, header)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-api-key", "good-key")
                    .header(AUTHORIZATION, "Bearer session-token")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
