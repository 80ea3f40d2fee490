//! Session cache: ephemeral sessions, revoked tokens, rate counters and user
//! snapshots.
//!
//! Every entry carries its own TTL, so nothing here needs explicit eviction.
//! The cache is never authoritative for identity; a miss on a user snapshot
//! means "ask the credential store".
//!
//! Key namespaces:
//!
//! | key                     | value             | ttl            |
//! |-------------------------|-------------------|----------------|
//! | `session:<token>`       | user id           | token lifetime |
//! | `blacklist:<token>`     | `true`            | token lifetime |
//! | `ratelimit:<client>`    | request counter   | 1 minute       |
//! | `user:<id>`             | user JSON         | 1 hour         |

pub mod memory;
pub mod redis;

pub use self::memory::MemorySessionCache;
pub use self::redis::RedisSessionCache;

use crate::model::User;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Fixed window for per-client request counters.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Lifetime of cached user snapshots.
pub const USER_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Map `token` to `user_id` for `ttl`.
    ///
    /// # Errors
    /// Returns an error if the cache is unreachable.
    async fn store_session(&self, user_id: &str, token: &str, ttl: Duration)
        -> Result<(), CacheError>;

    /// Owner of a live session, if any.
    ///
    /// # Errors
    /// Returns an error if the cache is unreachable.
    async fn session_user(&self, token: &str) -> Result<Option<String>, CacheError>;

    /// Mark `token` as revoked for `ttl`.
    ///
    /// # Errors
    /// Returns an error if the cache is unreachable.
    async fn blacklist_token(&self, token: &str, ttl: Duration) -> Result<(), CacheError>;

    /// # Errors
    /// Returns an error if the cache is unreachable.
    async fn is_blacklisted(&self, token: &str) -> Result<bool, CacheError>;

    /// Count one request from `client_key` in the current window.
    ///
    /// The window starts on the first request and is not extended by later ones.
    ///
    /// # Errors
    /// Returns an error if the cache is unreachable.
    async fn increment_request_count(&self, client_key: &str) -> Result<u64, CacheError>;

    /// Store a snapshot of `user` for [`USER_CACHE_TTL`].
    ///
    /// # Errors
    /// Returns an error if the user cannot be serialized or the cache is unreachable.
    async fn cache_user(&self, user: &User) -> Result<(), CacheError>;

    /// # Errors
    /// Returns an error if the cache is unreachable or the snapshot is unreadable.
    async fn cached_user(&self, user_id: Uuid) -> Result<Option<User>, CacheError>;

    /// Round trip used by `/health`.
    ///
    /// # Errors
    /// Returns an error if the cache is unreachable.
    async fn ping(&self) -> Result<(), CacheError>;
}

pub(crate) fn session_key(token: &str) -> String {
    format!("session:{token}")
}

pub(crate) fn blacklist_key(token: &str) -> String {
    format!("blacklist:{token}")
}

pub(crate) fn rate_limit_key(client_key: &str) -> String {
    format!("ratelimit:{client_key}")
}

pub(crate) fn user_key(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

/// TTL in whole seconds, never zero (a zero expiry is rejected by Redis).
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
