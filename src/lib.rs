//! # Marketplace (accounts, sessions and API-key gatekeeping)
//!
//! `marketplace` is the authentication backend of the marketplace: it registers
//! accounts, logs users in with a password, issues signed session tokens and
//! revokes them on logout.
//!
//! ## Components
//!
//! - **Credential store:** durable user records in `PostgreSQL`. Email and
//!   username are unique; passwords are only ever stored as Argon2id hashes.
//! - **Session cache:** `Redis` holds session records, the token blacklist,
//!   per-client request counters and short-lived user snapshots. Every entry
//!   carries a TTL.
//! - **Auth service:** register, login and logout. A token is accepted only when
//!   its signature and expiry verify, it is not blacklisted, and its session
//!   record still names the same user.
//! - **Gatekeeper:** optional middleware that requires a valid Unkey API key on
//!   every request. It fails closed when the verifier is unreachable.
//!
//! Login failures never reveal whether the email exists: unknown emails and
//! wrong passwords both answer `401 Invalid credentials`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod gatekeeper;
pub mod model;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
