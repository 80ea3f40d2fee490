//! In-process session cache with the same TTL semantics as Redis.
//!
//! Expiry uses `tokio::time::Instant`, so tests can drive it with a paused clock.

use super::{
    blacklist_key, rate_limit_key, session_key, user_key, CacheError, SessionCache,
    RATE_LIMIT_WINDOW, USER_CACHE_TTL,
};
use crate::model::User;
use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use uuid::Uuid;

#[derive(Debug)]
enum Value {
    Text(String),
    Counter(u64),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn set(&self, key: String, value: Value, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.insert(key, entry);
    }

    async fn get_text(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.live(now) => match &entry.value {
                Value::Text(text) => Some(text.clone()),
                Value::Counter(count) => Some(count.to_string()),
            },
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn store_session(
        &self,
        user_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.set(session_key(token), Value::Text(user_id.to_string()), ttl)
            .await;
        Ok(())
    }

    async fn session_user(&self, token: &str) -> Result<Option<String>, CacheError> {
        Ok(self.get_text(&session_key(token)).await)
    }

    async fn blacklist_token(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        self.set(blacklist_key(token), Value::Text("true".to_string()), ttl)
            .await;
        Ok(())
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, CacheError> {
        Ok(self.get_text(&blacklist_key(token)).await.is_some())
    }

    async fn increment_request_count(&self, client_key: &str) -> Result<u64, CacheError> {
        let now = Instant::now();
        let key = rate_limit_key(client_key);
        let mut entries = self.entries.lock().await;

        let entry = entries
            .entry(key)
            .and_modify(|entry| {
                if !entry.live(now) {
                    *entry = Entry {
                        value: Value::Counter(0),
                        expires_at: now + RATE_LIMIT_WINDOW,
                    };
                }
            })
            .or_insert_with(|| Entry {
                value: Value::Counter(0),
                expires_at: now + RATE_LIMIT_WINDOW,
            });

        let count = match entry.value {
            Value::Counter(count) => count + 1,
            // Same as INCR on a non-numeric value: start over.
            Value::Text(_) => 1,
        };
        entry.value = Value::Counter(count);

        Ok(count)
    }

    async fn cache_user(&self, user: &User) -> Result<(), CacheError> {
        let snapshot = serde_json::to_string(user)?;
        self.set(user_key(user.id), Value::Text(snapshot), USER_CACHE_TTL)
            .await;
        Ok(())
    }

    async fn cached_user(&self, user_id: Uuid) -> Result<Option<User>, CacheError> {
        self.get_text(&user_key(user_id))
            .await
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
