//! Map validated CLI arguments to an action.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, cache, gatekeeper, store, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let store_opts = store::Options::parse(matches)?;
    let cache_opts = cache::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;
    let gatekeeper_opts = gatekeeper::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn: store_opts.dsn,
        database: store_opts.database,
        cache_url: cache_opts.url,
        cache_password: cache_opts.password,
        token_secret: auth_opts.token_secret,
        token_ttl: auth_opts.token_ttl,
        rate_limit_per_minute: auth_opts.rate_limit_per_minute,
        request_timeout: auth_opts.request_timeout,
        trust_proxy_headers: auth_opts.trust_proxy_headers,
        gatekeeper: gatekeeper_opts,
    }))
}
