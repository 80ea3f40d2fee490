//! Auth Service: accounts, password verification, session tokens and revocation.
//!
//! Tokens are HS256 JWTs signed with the server secret. A token is only honoured
//! while its `session:<token>` entry lives in the cache and no
//! `blacklist:<token>` entry exists.

mod error;
mod password;
mod service;
mod token;
mod validation;

pub use error::{AuthError, ErrorBody};
pub use service::{AuthService, LoginOutcome, Principal};
pub use token::{SessionClaims, TokenSigner, MIN_SECRET_BYTES};
