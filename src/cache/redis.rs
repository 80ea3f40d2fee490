//! Redis-backed session cache.

use super::{
    blacklist_key, rate_limit_key, session_key, ttl_seconds, user_key, CacheError, SessionCache,
    RATE_LIMIT_WINDOW, USER_CACHE_TTL,
};
use crate::model::User;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{info_span, Instrument};
use url::Url;
use uuid::Uuid;

// INCR and the first EXPIRE run as one script so concurrent first hits cannot
// reset the window, and later hits never extend it.
static INCREMENT_IN_WINDOW: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
",
    )
});

#[derive(Clone)]
pub struct RedisSessionCache {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisSessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionCache").finish_non_exhaustive()
    }
}

impl RedisSessionCache {
    /// Connect and verify the cache answers `PING`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the cache is unreachable.
    pub async fn connect(url: &str, password: Option<&SecretString>) -> Result<Self> {
        let url = cache_url(url, password)?;
        let client = redis::Client::open(url.as_str()).context("Invalid cache URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to cache")?;

        let cache = Self { conn };
        cache.ping().await.context("Failed to ping cache")?;

        Ok(cache)
    }
}

/// Accept `host:port` as well as `redis://` URLs and inject the password.
fn cache_url(url: &str, password: Option<&SecretString>) -> Result<Url> {
    let raw = if url.contains("://") {
        url.to_string()
    } else {
        format!("redis://{url}")
    };
    let mut url = Url::parse(&raw).with_context(|| format!("Invalid cache URL: {raw}"))?;

    if let Some(password) = password.filter(|p| !p.expose_secret().is_empty()) {
        url.set_password(Some(password.expose_secret()))
            .map_err(|()| anyhow!("Error setting cache password"))?;
    }

    Ok(url)
}

fn command_span(operation: &'static str) -> tracing::Span {
    info_span!("cache.command", db.system = "redis", db.operation = operation)
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn store_session(
        &self,
        user_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(session_key(token), user_id, ttl_seconds(ttl))
            .instrument(command_span("SET"))
            .await?;
        Ok(())
    }

    async fn session_user(&self, token: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let user_id: Option<String> = conn
            .get(session_key(token))
            .instrument(command_span("GET"))
            .await?;
        Ok(user_id)
    }

    async fn blacklist_token(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(blacklist_key(token), true, ttl_seconds(ttl))
            .instrument(command_span("SET"))
            .await?;
        Ok(())
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(blacklist_key(token))
            .instrument(command_span("EXISTS"))
            .await?;
        Ok(exists)
    }

    async fn increment_request_count(&self, client_key: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let count: u64 = INCREMENT_IN_WINDOW
            .key(rate_limit_key(client_key))
            .arg(ttl_seconds(RATE_LIMIT_WINDOW))
            .invoke_async(&mut conn)
            .instrument(command_span("EVALSHA"))
            .await?;
        Ok(count)
    }

    async fn cache_user(&self, user: &User) -> Result<(), CacheError> {
        let snapshot = serde_json::to_string(user)?;
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(user_key(user.id), snapshot, ttl_seconds(USER_CACHE_TTL))
            .instrument(command_span("SET"))
            .await?;
        Ok(())
    }

    async fn cached_user(&self, user_id: Uuid) -> Result<Option<User>, CacheError> {
        let mut conn = self.conn.clone();
        let snapshot: Option<String> = conn
            .get(user_key(user_id))
            .instrument(command_span("GET"))
            .await?;
        snapshot
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .instrument(command_span("PING"))
            .await?;
        Ok(())
    }
}
