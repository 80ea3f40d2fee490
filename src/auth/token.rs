//! HS256 session tokens.

use super::AuthError;
use crate::model::Role;
use jwt_simple::prelude::{Claims, HS256Key, MACLike, VerificationOptions};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use ulid::Ulid;
use uuid::Uuid;

/// Custom claims carried by every session token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: String,
    pub role: Role,
}

/// Shortest accepted HS256 secret, in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

/// Signs and verifies session tokens with the server-held secret.
#[derive(Clone)]
pub struct TokenSigner {
    key: HS256Key,
    ttl: Duration,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Build a signer for `secret`.
    ///
    /// # Errors
    /// Returns `AuthError::TokenSigning` if the secret is shorter than
    /// [`MIN_SECRET_BYTES`].
    pub fn new(secret: &SecretString, ttl: Duration) -> Result<Self, AuthError> {
        let secret = secret.expose_secret().as_bytes();
        if secret.len() < MIN_SECRET_BYTES {
            return Err(AuthError::TokenSigning(format!(
                "secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        Ok(Self {
            key: HS256Key::from_bytes(secret),
            ttl,
        })
    }

    /// Token lifetime; also the lifetime of sessions and blacklist entries.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `user_id` expiring after [`Self::ttl`].
    ///
    /// Each token carries a unique id, so two logins in the same second still
    /// get distinct tokens and revoking one leaves the other alone.
    ///
    /// # Errors
    /// Returns `AuthError::TokenSigning` if the token cannot be produced.
    pub fn sign(&self, user_id: Uuid, role: Role) -> Result<String, AuthError> {
        let custom = SessionClaims {
            user_id: user_id.to_string(),
            role,
        };
        let claims = Claims::with_custom_claims(
            custom,
            jwt_simple::prelude::Duration::from_secs(self.ttl.as_secs()),
        )
        .with_jwt_id(Ulid::new().to_string());

        self.key
            .authenticate(claims)
            .map_err(|err| AuthError::TokenSigning(err.to_string()))
    }

    /// Check signature and expiry and return the custom claims.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidToken` for any malformed, forged or expired token.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let options = VerificationOptions {
            time_tolerance: Some(jwt_simple::prelude::Duration::from_secs(0)),
            ..VerificationOptions::default()
        };
        self.key
            .verify_token::<SessionClaims>(token, Some(options))
            .map(|claims| claims.custom)
            .map_err(|_| AuthError::InvalidToken)
    }
}
