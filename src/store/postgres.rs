//! Postgres-backed credential store.

use super::{CredentialStore, StoreError};
use crate::model::{CreditTransaction, Credits, Notification, PasswordHash, User, UserProfile};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Connection, PgPool, Row,
};
use std::time::Duration;
use tracing::{info_span, Instrument};
use url::Url;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const EMAIL_CONSTRAINT: &str = "users_email_key";
const USERNAME_CONSTRAINT: &str = "users_username_key";

const USER_COLUMNS: &str = "id, username, email, password_hash, role, status, profile, \
    credit_balance, credit_transactions, notifications, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the store and make sure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the DSN is invalid, the database is unreachable or the
    /// schema cannot be applied.
    pub async fn connect(dsn: &str, database: &str) -> Result<Self> {
        let dsn = database_dsn(dsn, database)?;

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(&dsn)
            .await
            .context("Failed to connect to database")?;

        let store = Self::new(pool);
        store.apply_schema().await?;

        Ok(store)
    }

    /// Apply `sql/schema.sql`; every statement is idempotent.
    ///
    /// # Errors
    /// Returns an error if a statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("Failed to apply users schema")?;
        Ok(())
    }

    /// Release every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Replace the DSN path with the configured database name.
fn database_dsn(dsn: &str, database: &str) -> Result<String> {
    let mut url = Url::parse(dsn).context("Invalid database DSN")?;
    if database.trim().is_empty() {
        return Err(anyhow!("Database name must not be empty"));
    }
    url.set_path(&format!("/{}", database.trim()));
    Ok(url.to_string())
}

/// Map a Postgres unique violation (SQLSTATE 23505) to the conflicting field.
fn unique_violation(err: &sqlx::Error) -> Option<StoreError> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    if !db_err.code().is_some_and(|code| code.as_ref() == "23505") {
        return None;
    }
    match db_err.constraint() {
        Some(EMAIL_CONSTRAINT) => Some(StoreError::DuplicateEmail),
        Some(USERNAME_CONSTRAINT) => Some(StoreError::DuplicateUsername),
        _ => None,
    }
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;
    let password_hash: String = row.try_get("password_hash")?;
    let Json(profile): Json<UserProfile> = row.try_get("profile")?;
    let Json(transactions): Json<Vec<CreditTransaction>> = row.try_get("credit_transactions")?;
    let Json(notifications): Json<Vec<Notification>> = row.try_get("notifications")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: PasswordHash::from(password_hash),
        role: role.parse().map_err(StoreError::Corrupt)?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        profile,
        credits: Credits {
            balance: row.try_get("credit_balance")?,
            transactions,
        },
        notifications,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO users
                (id, username, email, password_hash, role, status, profile,
                 credit_balance, credit_transactions, notifications, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.password_hash.expose())
            .bind(user.role.as_str())
            .bind(user.status.as_str())
            .bind(Json(&user.profile))
            .bind(user.credits.balance)
            .bind(Json(&user.credits.transactions))
            .bind(Json(&user.notifications))
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| unique_violation(&err).unwrap_or(StoreError::Database(err)))?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
