use crate::{
    api::{self, ServerOptions},
    auth::{AuthService, TokenSigner},
    cache::RedisSessionCache,
    cli::{commands::gatekeeper, telemetry},
    gatekeeper::{Gatekeeper, UnkeyVerifier},
    store::PgCredentialStore,
};
use anyhow::{Context, Result};
use axum::http::HeaderName;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub database: String,
    pub cache_url: String,
    pub cache_password: Option<SecretString>,
    pub token_secret: SecretString,
    pub token_ttl: Duration,
    pub rate_limit_per_minute: u64,
    pub request_timeout: Duration,
    pub trust_proxy_headers: bool,
    pub gatekeeper: Option<gatekeeper::Options>,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the token secret is too short, the credential store or
/// session cache is unreachable, the gatekeeper cannot be configured, or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let signer =
        TokenSigner::new(&args.token_secret, args.token_ttl).context("Invalid token secret")?;

    let store = PgCredentialStore::connect(&args.dsn, &args.database).await?;
    info!(database = %args.database, "Credential store ready");

    let cache = RedisSessionCache::connect(&args.cache_url, args.cache_password.as_ref()).await?;
    info!("Session cache ready");

    let auth = Arc::new(AuthService::new(
        Arc::new(store.clone()),
        Arc::new(cache),
        signer,
    ));
    if !auth.warm_up().await {
        warn!("Decoy password hash unavailable, unknown-email logins skip verification");
    }

    let gatekeeper = args.gatekeeper.map(build_gatekeeper).transpose()?;
    if gatekeeper.is_none() {
        debug!("No gatekeeper API id configured, API keys are not required");
    }

    let options = ServerOptions {
        rate_limit_per_minute: args.rate_limit_per_minute,
        request_timeout: args.request_timeout,
        trust_proxy_headers: args.trust_proxy_headers,
    };

    let result = api::serve(args.port, api::app(auth, gatekeeper, &options)).await;

    store.close().await;
    telemetry::shutdown_tracer();

    result
}

fn build_gatekeeper(options: gatekeeper::Options) -> Result<Arc<Gatekeeper>> {
    let header = HeaderName::try_from(options.header.to_ascii_lowercase())
        .with_context(|| format!("Invalid gatekeeper header: {}", options.header))?;

    let verifier = UnkeyVerifier::new(&options.url, options.root_key, options.timeout)?;

    info!(api_id = %options.api_id, header = %header, "Gatekeeper enabled");

    Ok(Arc::new(Gatekeeper::new(
        Arc::new(verifier),
        options.api_id,
        header,
    )))
}
