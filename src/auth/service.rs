//! Registration, login, logout and session-token authentication.
//!
//! Flow Overview:
//! 1) Validate input before touching the store.
//! 2) Register inserts optimistically and lets the store's unique constraints
//!    decide conflicts.
//! 3) Login verifies the password, then the account status, then signs a token
//!    and records the session in the cache.
//! 4) Logout blacklists the token for the full token lifetime.
//! 5) Authenticated requests must present a token that is not blacklisted,
//!    verifies, and still has a live session entry owned by the same user.

use super::{
    password,
    token::TokenSigner,
    validation::{normalize_email, strip_bearer, validate_login, validate_registration},
    AuthError,
};
use crate::{
    cache::SessionCache,
    model::{Role, User},
    store::{CredentialStore, StoreError},
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Successful login: the bearer token and the account it belongs to.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

/// Authenticated caller resolved from a session token.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn SessionCache>,
    signer: TokenSigner,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn SessionCache>,
        signer: TokenSigner,
    ) -> Self {
        Self {
            store,
            cache,
            signer,
        }
    }

    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        self.signer.ttl()
    }

    /// Create an account.
    ///
    /// # Errors
    /// `Validation` for bad input, `DuplicateEmail`/`DuplicateUsername` on
    /// conflicts, `Hashing` or `Persistence` for internal failures.
    #[instrument(skip(self, email, password))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let username = username.trim();
        let email = normalize_email(email);
        validate_registration(username, &email, password)?;

        let password_hash = password::hash_password(password).await?;
        let user = User::new(username.to_string(), email, password_hash);

        self.store
            .insert_user(&user)
            .await
            .map_err(|err| match err {
                StoreError::DuplicateEmail => AuthError::DuplicateEmail,
                StoreError::DuplicateUsername => AuthError::DuplicateUsername,
                other => AuthError::Persistence(other),
            })?;

        // The store is authoritative; a missing snapshot only costs a lookup later.
        if let Err(err) = self.cache.cache_user(&user).await {
            warn!("Failed to cache user {}: {err}", user.id);
        }

        info!(user_id = %user.id, "User registered");

        Ok(user)
    }

    /// Verify credentials and open a session.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown email or wrong password (the two are
    /// indistinguishable), `AccountNotActive` for suspended or banned accounts,
    /// `TokenSigning`/`SessionPersistence`/`Store` for internal failures.
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        validate_login(&email, password)?;

        let Some(user) = self
            .store
            .find_by_email(&email)
            .await
            .map_err(AuthError::Store)?
        else {
            password::burn_verification(password).await;
            debug!("Login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &user.password_hash).await? {
            debug!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        // Status is only revealed to callers who proved the password.
        if !user.is_active() {
            return Err(AuthError::AccountNotActive);
        }

        let token = self.signer.sign(user.id, user.role)?;

        self.cache
            .store_session(&user.id.to_string(), &token, self.signer.ttl())
            .await
            .map_err(AuthError::SessionPersistence)?;

        info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome { token, user })
    }

    /// Revoke the presented token. A missing or empty token is a no-op.
    ///
    /// # Errors
    /// `Revocation` if the blacklist entry cannot be written.
    #[instrument(skip(self, authorization))]
    pub async fn logout(&self, authorization: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = authorization.map(strip_bearer).filter(|token| !token.is_empty())
        else {
            return Ok(());
        };

        self.cache
            .blacklist_token(token, self.signer.ttl())
            .await
            .map_err(AuthError::Revocation)?;

        debug!("Token revoked");

        Ok(())
    }

    /// Resolve an `Authorization` value into the calling principal.
    ///
    /// # Errors
    /// `InvalidToken` if the token is missing, blacklisted, forged, expired or
    /// has no live session for its user; `Cache` if the cache cannot be read.
    pub async fn authenticate(&self, authorization: &str) -> Result<Principal, AuthError> {
        let token = strip_bearer(authorization);
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        if self
            .cache
            .is_blacklisted(token)
            .await
            .map_err(AuthError::Cache)?
        {
            return Err(AuthError::InvalidToken);
        }

        let claims = self.signer.verify(token)?;
        let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| AuthError::InvalidToken)?;

        match self
            .cache
            .session_user(token)
            .await
            .map_err(AuthError::Cache)?
        {
            Some(owner) if owner == claims.user_id => Ok(Principal {
                user_id,
                role: claims.role,
            }),
            _ => Err(AuthError::InvalidToken),
        }
    }

    /// Load the principal's user record, cache first.
    ///
    /// # Errors
    /// `UserNotFound` if the record is gone, `Store` if the store cannot be read.
    pub async fn current_user(&self, principal: &Principal) -> Result<User, AuthError> {
        match self.cache.cached_user(principal.user_id).await {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            Err(err) => warn!("Failed to read cached user {}: {err}", principal.user_id),
        }

        let user = self
            .store
            .find_by_id(principal.user_id)
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::UserNotFound)?;

        if let Err(err) = self.cache.cache_user(&user).await {
            warn!("Failed to cache user {}: {err}", user.id);
        }

        Ok(user)
    }

    /// Build the decoy password hash used for unknown-email logins, so the
    /// first such login costs the same as later ones.
    pub async fn warm_up(&self) -> bool {
        password::prepare_decoy().await
    }

    /// Health of the store and the cache, in that order.
    pub async fn dependency_health(&self) -> (bool, bool) {
        let store = match self.store.ping().await {
            Ok(()) => true,
            Err(err) => {
                warn!("Credential store ping failed: {err}");
                false
            }
        };
        let cache = match self.cache.ping().await {
            Ok(()) => true,
            Err(err) => {
                warn!("Session cache ping failed: {err}");
                false
            }
        };
        (store, cache)
    }

    /// Per-client request counter for rate limiting.
    ///
    /// # Errors
    /// `Cache` if the counter cannot be incremented.
    pub async fn count_request(&self, client_key: &str) -> Result<u64, AuthError> {
        self.cache
            .increment_request_count(client_key)
            .await
            .map_err(AuthError::Cache)
    }
}
