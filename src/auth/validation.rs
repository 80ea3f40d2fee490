//! Input checks applied before any store or cache access.

use super::AuthError;
use regex::Regex;

const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 50;
const PASSWORD_MIN_CHARS: usize = 8;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(super) fn validate_registration(
    username: &str,
    email_normalized: &str,
    password: &str,
) -> Result<(), AuthError> {
    let username_len = username.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&username_len) {
        return Err(AuthError::Validation(format!(
            "username must be {USERNAME_MIN_CHARS}-{USERNAME_MAX_CHARS} characters"
        )));
    }
    if !valid_email(email_normalized) {
        return Err(AuthError::Validation("invalid email".to_string()));
    }
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(AuthError::Validation(format!(
            "password must be at least {PASSWORD_MIN_CHARS} characters"
        )));
    }
    Ok(())
}

pub(super) fn validate_login(email_normalized: &str, password: &str) -> Result<(), AuthError> {
    if !valid_email(email_normalized) {
        return Err(AuthError::Validation("invalid email".to_string()));
    }
    if password.is_empty() {
        return Err(AuthError::Validation("password is required".to_string()));
    }
    Ok(())
}

/// Drop an optional `Bearer ` scheme from an `Authorization` value.
pub(crate) fn strip_bearer(value: &str) -> &str {
    let value = value.trim_start();
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@example.com"));
    }

    #[test]
    fn username_length_bounds() {
        let fifty = "u".repeat(50);
        assert!(validate_registration("abc", "a@example.com", "password").is_ok());
        assert!(validate_registration(&fifty, "a@example.com", "password").is_ok());
        assert!(validate_registration("ab", "a@example.com", "password").is_err());
        assert!(validate_registration(&"u".repeat(51), "a@example.com", "password").is_err());
        // Counted in characters, not bytes.
        assert!(validate_registration("ñña", "a@example.com", "password").is_ok());
    }

    #[test]
    fn password_minimum_length() {
        assert!(validate_registration("alice", "a@example.com", "1234567").is_err());
        assert!(validate_registration("alice", "a@example.com", "12345678").is_ok());
    }

    #[test]
    fn login_requires_email_and_password() {
        assert!(validate_login("a@example.com", "x").is_ok());
        assert!(validate_login("a@example.com", "").is_err());
        assert!(validate_login("", "secret").is_err());
    }

    #[test]
    fn strip_bearer_variants() {
        assert_eq!(strip_bearer("Bearer abc.def"), "abc.def");
        assert_eq!(strip_bearer("bearer abc.def"), "abc.def");
        assert_eq!(strip_bearer("abc.def"), "abc.def");
        assert_eq!(strip_bearer("  Bearer   abc  "), "abc");
        assert_eq!(strip_bearer("Bearer "), "");
    }
}
