//! Credential store: the authoritative home of user records.
//!
//! Email and username uniqueness is enforced by the backend itself. Callers do
//! not pre-check for duplicates; they insert and translate the violation.

pub mod memory;
pub mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

use crate::model::User;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("username already taken")]
    DuplicateUsername,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt user record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a new user.
    ///
    /// # Errors
    /// `DuplicateEmail`/`DuplicateUsername` when a uniqueness constraint fires,
    /// `Database` for any other backend failure.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Look up a user by normalized email.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be queried.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Look up a user by id.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be queried.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Round trip used by `/health`.
    ///
    /// # Errors
    /// Returns an error if the backend is unreachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
