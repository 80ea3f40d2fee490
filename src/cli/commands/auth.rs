use crate::auth::MIN_SECRET_BYTES;
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_RATE_LIMIT_PER_MINUTE: &str = "rate-limit-per-minute";
pub const ARG_REQUEST_TIMEOUT_SECONDS: &str = "request-timeout-seconds";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_http_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Secret used to sign session tokens (HS256, at least 32 bytes)")
                .env("MARKETPLACE_TOKEN_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Session token and session record TTL in seconds")
                .env("MARKETPLACE_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_http_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_PER_MINUTE)
                .long(ARG_RATE_LIMIT_PER_MINUTE)
                .help("Requests allowed per client per minute (0 disables limiting)")
                .env("MARKETPLACE_RATE_LIMIT_PER_MINUTE")
                .default_value("0")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT_SECONDS)
                .long(ARG_REQUEST_TIMEOUT_SECONDS)
                .help("Deadline for a whole request in seconds")
                .env("MARKETPLACE_REQUEST_TIMEOUT_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Rate-limit by X-Forwarded-For / X-Real-IP (only behind a proxy that sets them)")
                .env("MARKETPLACE_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug)]
pub struct Options {
    pub token_secret: SecretString,
    pub token_ttl: Duration,
    pub rate_limit_per_minute: u64,
    pub request_timeout: Duration,
    pub trust_proxy_headers: bool,
}

impl Options {
    /// Parse token and HTTP arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the token secret is missing or shorter than
    /// `MIN_SECRET_BYTES`.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let token_secret = match matches.get_one::<String>(ARG_TOKEN_SECRET) {
            Some(value) if !value.trim().is_empty() => value,
            _ => anyhow::bail!("missing required argument: --{ARG_TOKEN_SECRET}"),
        };
        if token_secret.len() < MIN_SECRET_BYTES {
            anyhow::bail!("--{ARG_TOKEN_SECRET} must be at least {MIN_SECRET_BYTES} bytes");
        }
        let token_secret = SecretString::from(token_secret.clone());

        let seconds = |id: &str, default: u64| matches.get_one::<u64>(id).copied().unwrap_or(default);

        Ok(Self {
            token_secret,
            token_ttl: Duration::from_secs(seconds(ARG_TOKEN_TTL_SECONDS, 86_400)),
            rate_limit_per_minute: seconds(ARG_RATE_LIMIT_PER_MINUTE, 0),
            request_timeout: Duration::from_secs(seconds(ARG_REQUEST_TIMEOUT_SECONDS, 30)),
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
        })
    }
}
