//! Validation and password-hashing helpers for the auth endpoints.

use anyhow::{Context, Result};
use regex::Regex;

/// Normalize an email for lookup and uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic format check on an already-normalized email.
pub(super) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Normalize a mobile number: strip separators, keep a leading `+`.
pub(super) fn normalize_mobile(mobile: &str) -> String {
    let trimmed = mobile.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    for (index, ch) in trimmed.chars().enumerate() {
        if ch.is_ascii_digit() || (ch == '+' && index == 0) {
            normalized.push(ch);
        }
    }
    normalized
}

/// E.164-shaped check on an already-normalized mobile number.
pub(super) fn valid_mobile(mobile: &str) -> bool {
    Regex::new(r"^\+?[1-9][0-9]{6,14}$").is_ok_and(|regex| regex.is_match(mobile))
}

/// Hash a password off the async runtime; bcrypt burns tens of milliseconds.
pub(super) async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")
}

/// Compare a password against a stored bcrypt hash off the async runtime.
pub(super) async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("password check task failed")?
        .context("failed to check password")
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Bob@Example.COM "), "bob@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn normalize_mobile_strips_separators() {
        assert_eq!(normalize_mobile(" +1 (555) 000-1111 "), "+15550001111");
        assert_eq!(normalize_mobile("07 123 456 78"), "0712345678");
    }

    #[test]
    fn valid_mobile_accepts_e164_shapes() {
        assert!(valid_mobile("+15550001111"));
        assert!(valid_mobile("447912345678"));
        assert!(!valid_mobile("+0123"));
        assert!(!valid_mobile("123"));
        assert!(!valid_mobile("not-a-number"));
    }

    #[tokio::test]
    async fn password_hash_round_trip() -> Result<()> {
        let hash = hash_password("correct horse".to_string()).await?;
        assert!(verify_password("correct horse".to_string(), hash.clone()).await?);
        assert!(!verify_password("wrong horse".to_string(), hash).await?);
        Ok(())
    }

    #[test]
    fn is_unique_violation_ignores_other_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
