use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_CACHE_URL: &str = "cache-url";
pub const ARG_CACHE_PASSWORD: &str = "cache-password";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CACHE_URL)
                .long(ARG_CACHE_URL)
                .help("Session cache address (redis://host:port or host:port)")
                .env("MARKETPLACE_CACHE_URL")
                .default_value("redis://localhost:6379"),
        )
        .arg(
            Arg::new(ARG_CACHE_PASSWORD)
                .long(ARG_CACHE_PASSWORD)
                .help("Session cache password")
                .env("MARKETPLACE_CACHE_PASSWORD")
                .hide_env_values(true),
        )
}

#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub password: Option<SecretString>,
}

impl Options {
    /// Parse session cache arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the cache URL is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let url = match matches.get_one::<String>(ARG_CACHE_URL) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_CACHE_URL}"),
        };

        let password = matches
            .get_one::<String>(ARG_CACHE_PASSWORD)
            .filter(|v| !v.is_empty())
            .map(|v| SecretString::from(v.clone()));

        Ok(Self { url, password })
    }
}
