use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_GATEKEEPER_API_ID: &str = "gatekeeper-api-id";
pub const ARG_GATEKEEPER_ROOT_KEY: &str = "gatekeeper-root-key";
pub const ARG_GATEKEEPER_URL: &str = "gatekeeper-url";
pub const ARG_GATEKEEPER_HEADER: &str = "gatekeeper-header";
pub const ARG_GATEKEEPER_TIMEOUT_SECONDS: &str = "gatekeeper-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GATEKEEPER_API_ID)
                .long(ARG_GATEKEEPER_API_ID)
                .help("Unkey API id whose keys may call this service (unset disables the gatekeeper)")
                .env("MARKETPLACE_GATEKEEPER_API_ID"),
        )
        .arg(
            Arg::new(ARG_GATEKEEPER_ROOT_KEY)
                .long(ARG_GATEKEEPER_ROOT_KEY)
                .help("Unkey root key used to call the verification endpoint")
                .env("MARKETPLACE_GATEKEEPER_ROOT_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_GATEKEEPER_URL)
                .long(ARG_GATEKEEPER_URL)
                .help("Unkey base URL")
                .env("MARKETPLACE_GATEKEEPER_URL")
                .default_value("https://api.unkey.dev"),
        )
        .arg(
            Arg::new(ARG_GATEKEEPER_HEADER)
                .long(ARG_GATEKEEPER_HEADER)
                .help("Request header carrying the API key")
                .env("MARKETPLACE_GATEKEEPER_HEADER")
                .default_value("authorization"),
        )
        .arg(
            Arg::new(ARG_GATEKEEPER_TIMEOUT_SECONDS)
                .long(ARG_GATEKEEPER_TIMEOUT_SECONDS)
                .help("Timeout for a single key verification in seconds")
                .env("MARKETPLACE_GATEKEEPER_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub api_id: String,
    pub root_key: SecretString,
    pub url: String,
    pub header: String,
    pub timeout: Duration,
}

impl Options {
    /// Parse gatekeeper arguments; `None` when no API id is configured.
    ///
    /// # Errors
    /// Returns an error if an API id is set without a root key.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Option<Self>> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let Some(api_id) = get_non_empty(ARG_GATEKEEPER_API_ID) else {
            return Ok(None);
        };

        let Some(root_key) = get_non_empty(ARG_GATEKEEPER_ROOT_KEY) else {
            anyhow::bail!("missing required argument: --{ARG_GATEKEEPER_ROOT_KEY}");
        };

        Ok(Some(Self {
            api_id,
            root_key: SecretString::from(root_key),
            url: get_non_empty(ARG_GATEKEEPER_URL)
                .unwrap_or_else(|| "https://api.unkey.dev".to_string()),
            header: get_non_empty(ARG_GATEKEEPER_HEADER)
                .unwrap_or_else(|| "authorization".to_string()),
            timeout: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_GATEKEEPER_TIMEOUT_SECONDS)
                    .copied()
                    .unwrap_or(5),
            ),
        }))
    }
}
