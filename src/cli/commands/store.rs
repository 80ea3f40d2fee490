use clap::{Arg, ArgMatches, Command};

pub const ARG_DSN: &str = "dsn";
pub const ARG_DATABASE: &str = "database";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Credential store connection string")
                .long_help(
                    "Credential store connection string. The path is replaced by --database, so only scheme, credentials, host and port matter.",
                )
                .env("MARKETPLACE_DSN")
                .default_value("postgres://localhost:5432"),
        )
        .arg(
            Arg::new(ARG_DATABASE)
                .long("database")
                .help("Database holding the users table")
                .env("MARKETPLACE_DATABASE")
                .default_value("marketplace"),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: String,
    pub database: String,
}

impl Options {
    /// Parse credential store arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the DSN or database name is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let dsn = match matches.get_one::<String>(ARG_DSN) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_DSN}"),
        };
        let database = match matches.get_one::<String>(ARG_DATABASE) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_DATABASE}"),
        };

        Ok(Self { dsn, database })
    }
}
