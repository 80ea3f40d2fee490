//! User record and the sub-records persisted alongside it.
//!
//! The password hash lives on the record but is skipped by serde, so neither
//! API responses nor cached snapshots ever carry it.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Creator,
    Admin,
    Moderator,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Creator => "creator",
            Self::Admin => "admin",
            Self::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "standard" => Ok(Self::Standard),
            "creator" => Ok(Self::Creator),
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
    Banned,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "banned" => Ok(Self::Banned),
            other => Err(format!("unknown user status: {other}")),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub display_name: String,
    pub avatar: String,
    pub bio: String,
    pub interests: Vec<String>,
    pub social_links: Vec<String>,
    pub skills: Vec<String>,
    pub links: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CreditTransactionKind {
    Purchase,
    Refund,
    Deposit,
    Withdrawal,
    Gift,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreditTransaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: CreditTransactionKind,
    pub amount: f64,
    pub status: String,
    pub description: String,
    pub related_item_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Credits {
    pub balance: f64,
    pub transactions: Vec<CreditTransaction>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub related_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Encoded password hash (PHC string). Redacted in `Debug`.
pub struct PasswordHash(SecretString);

impl PasswordHash {
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for PasswordHash {
    fn from(encoded: String) -> Self {
        Self(SecretString::from(encoded))
    }
}

impl Default for PasswordHash {
    fn default() -> Self {
        Self::from(String::new())
    }
}

impl Clone for PasswordHash {
    fn clone(&self) -> Self {
        Self::from(self.expose().to_string())
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

/// A marketplace account.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: PasswordHash,
    pub role: Role,
    pub status: UserStatus,
    pub profile: UserProfile,
    pub credits: Credits,
    pub notifications: Vec<Notification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build the record for a fresh registration: active, standard role, no credits.
    #[must_use]
    pub fn new(username: String, email: String, password_hash: PasswordHash) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile: UserProfile {
                display_name: username.clone(),
                ..UserProfile::default()
            },
            username,
            email,
            password_hash,
            role: Role::Standard,
            status: UserStatus::Active,
            credits: Credits::default(),
            notifications: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}
