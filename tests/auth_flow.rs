//! End-to-end flows through the assembled router.
//!
//! The application is built exactly as the server builds it, with in-memory
//! credential store and session cache and a fake key verifier in place of
//! Unkey, then driven request by request with `oneshot`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header::AUTHORIZATION, HeaderName, Request, StatusCode},
    response::Response,
    Router,
};
use marketplace::{
    api::{self, ServerOptions},
    auth::{AuthService, TokenSigner},
    cache::MemorySessionCache,
    gatekeeper::{Gatekeeper, KeyVerdict, KeyVerifier, VerifyError, MISSING_KEY_MESSAGE},
    store::MemoryCredentialStore,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceExt;

const API_KEY_HEADER: &str = "x-api-key";
const API_KEY: &str = "key_live_123";

struct StaticVerifier;

#[async_trait]
impl KeyVerifier for StaticVerifier {
    async fn verify(&self, _api_id: &str, key: &str) -> Result<KeyVerdict, VerifyError> {
        Ok(if key == API_KEY {
            KeyVerdict::Valid
        } else {
            KeyVerdict::Invalid
        })
    }
}

fn auth_service() -> Result<Arc<AuthService>> {
    Ok(Arc::new(AuthService::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(MemorySessionCache::new()),
        TokenSigner::new(
            &SecretString::from("integration-test-secret-0123456789".to_string()),
            Duration::from_secs(3600),
        )?,
    )))
}

fn app_without_gatekeeper() -> Result<Router> {
    Ok(api::app(auth_service()?, None, &ServerOptions::default()))
}

fn app_with_gatekeeper() -> Result<Router> {
    let gatekeeper = Arc::new(Gatekeeper::new(
        Arc::new(StaticVerifier),
        "api_marketplace".to_string(),
        HeaderName::from_static(API_KEY_HEADER),
    ));
    Ok(api::app(
        auth_service()?,
        Some(gatekeeper),
        &ServerOptions::default(),
    ))
}

fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn with_bearer(method: &str, uri: &str, token: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())?)
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn text_body(response: Response) -> Result<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn alice() -> Value {
    json!({
        "username": "alice",
        "email": "Alice@Example.com",
        "password": "correct horse battery",
    })
}

#[tokio::test]
async fn register_login_logout_round() -> Result<()> {
    let app = app_without_gatekeeper()?;

    let response = app
        .clone()
        .oneshot(post_json("/auth/register", &alice())?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let user = json_body(response).await?;
    assert_eq!(user["username"], "alice");
    assert_eq!(user["email"], "alice@example.com");
    assert_eq!(user["role"], "standard");
    assert_eq!(user["status"], "active");
    assert!(user.get("password_hash").is_none());

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"email": "alice@example.com", "password": "wrong password"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await?["error"], "Invalid credentials");

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"email": "nobody@example.com", "password": "correct horse battery"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await?["error"], "Invalid credentials");

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"email": "ALICE@example.com", "password": "correct horse battery"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await?;
    let token = outcome["token"]
        .as_str()
        .context("login response has no token")?
        .to_string();
    assert_eq!(outcome["user"]["id"], user["id"]);

    let response = app
        .clone()
        .oneshot(with_bearer("GET", "/auth/session", &token)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["user_id"], user["id"]);

    let response = app
        .clone()
        .oneshot(with_bearer("GET", "/users/me", &token)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["username"], "alice");

    let response = app
        .clone()
        .oneshot(with_bearer("POST", "/auth/logout", &token)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(with_bearer("GET", "/auth/session", &token)?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await?["error"],
        "Invalid or expired token"
    );

    let response = app
        .oneshot(with_bearer("GET", "/users/me", &token)?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn duplicate_email_and_username_conflict() -> Result<()> {
    let app = app_without_gatekeeper()?;

    let response = app
        .clone()
        .oneshot(post_json("/auth/register", &alice())?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "alice2", "email": "alice@example.com", "password": "another password"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await?["error"], "Email already registered");

    let response = app
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "alice", "email": "other@example.com", "password": "another password"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await?["error"], "Username already taken");
    Ok(())
}

#[tokio::test]
async fn invalid_input_is_bad_request() -> Result<()> {
    let app = app_without_gatekeeper()?;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/register")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await?["error"], "Invalid request");

    let response = app
        .oneshot(post_json(
            "/auth/register",
            &json!({"username": "bob", "email": "bob@example.com", "password": "short"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = json_body(response).await?;
    assert!(error["error"]
        .as_str()
        .is_some_and(|message| message.starts_with("Invalid request: ")));
    Ok(())
}

#[tokio::test]
async fn logout_without_token_is_ok() -> Result<()> {
    let response = app_without_gatekeeper()?
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn gatekeeper_guards_every_route() -> Result<()> {
    let app = app_with_gatekeeper()?;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(text_body(response).await?, MISSING_KEY_MESSAGE);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(API_KEY_HEADER, "key_stolen")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(API_KEY_HEADER, API_KEY)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text_body(response).await?, "Hello, World!");

    // The session token travels in Authorization next to the API key.
    let mut request = post_json("/auth/register", &alice())?;
    request
        .headers_mut()
        .insert(API_KEY_HEADER, API_KEY.parse()?);
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    Ok(())
}

fn from_peer(peer: [u8; 4], forwarded_for: &str) -> Result<Request<Body>> {
    let mut request = Request::builder()
        .uri("/")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())?;
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40_000))));
    Ok(request)
}

#[tokio::test]
async fn rate_limit_keys_on_peer_address() -> Result<()> {
    let options = ServerOptions {
        rate_limit_per_minute: 2,
        ..ServerOptions::default()
    };
    let app = api::app(auth_service()?, None, &options);

    // A spoofed, rotating X-Forwarded-For does not earn a fresh budget.
    for forwarded in ["10.0.0.1", "10.0.0.2"] {
        let response = app
            .clone()
            .oneshot(from_peer([203, 0, 113, 9], forwarded)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(from_peer([203, 0, 113, 9], "10.0.0.3")?)
        .await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(text_body(response).await?, "Too Many Requests");

    let response = app
        .oneshot(from_peer([198, 51, 100, 4], "10.0.0.3")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn short_token_secret_is_refused_up_front() {
    let signer = TokenSigner::new(
        &SecretString::from("s3cret".to_string()),
        Duration::from_secs(3600),
    );
    assert!(signer.is_err());
}
