//! Argon2id password hashing.
//!
//! Hashing is CPU-bound, so both directions run on the blocking pool.

use super::AuthError;
use crate::model::PasswordHash;
use argon2::{
    password_hash::{self, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use tokio::task;

// Verified against when the email is unknown, so that path costs the same as
// a wrong password.
static DECOY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_blocking("marketplace-decoy-password").ok());

fn hash_blocking(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn verify_blocking(password: &str, encoded: &str) -> Result<bool, password_hash::Error> {
    let parsed = password_hash::PasswordHash::new(encoded)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Hash `password` with a fresh random salt.
///
/// # Errors
/// Returns `AuthError::Hashing` if hashing fails or the blocking task panics.
pub(super) async fn hash_password(password: &str) -> Result<PasswordHash, AuthError> {
    let password = password.to_string();
    task::spawn_blocking(move || hash_blocking(&password))
        .await
        .map_err(|err| AuthError::Hashing(err.to_string()))?
        .map(PasswordHash::from)
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

/// Check `password` against a stored PHC string.
///
/// # Errors
/// Returns `AuthError::Hashing` if the stored hash is unreadable.
pub(super) async fn verify_password(password: &str, hash: &PasswordHash) -> Result<bool, AuthError> {
    let password = password.to_string();
    let encoded = hash.expose().to_string();
    task::spawn_blocking(move || verify_blocking(&password, &encoded))
        .await
        .map_err(|err| AuthError::Hashing(err.to_string()))?
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

/// Compute the decoy hash now so the first unknown-email login does not pay
/// for it. Returns false if the decoy could not be built.
pub(super) async fn prepare_decoy() -> bool {
    task::spawn_blocking(|| DECOY_HASH.is_some())
        .await
        .unwrap_or(false)
}

/// Spend one verification on the decoy hash; the result is discarded.
pub(super) async fn burn_verification(password: &str) {
    let password = password.to_string();
    let _ = task::spawn_blocking(move || {
        DECOY_HASH
            .as_deref()
            .map(|decoy| verify_blocking(&password, decoy))
    })
    .await;
}
