//! Reset-ticket types and the expiry arithmetic shared by issue and rotate.

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

pub const PURPOSE_RESET_PASSWORD: &str = "reset_password";

/// Expiry policy for one reset episode.
///
/// `ticket_ttl` is the renewable rotation window; `absolute_window` is the
/// hard ceiling fixed when the first ticket of the episode is issued.
#[derive(Clone, Copy, Debug)]
pub struct TicketPolicy {
    pub ticket_ttl: Duration,
    pub absolute_window: Duration,
}

impl TicketPolicy {
    #[must_use]
    pub fn from_minutes(ticket_ttl_minutes: i64, absolute_window_minutes: i64) -> Self {
        Self {
            ticket_ttl: Duration::minutes(ticket_ttl_minutes),
            absolute_window: Duration::minutes(absolute_window_minutes),
        }
    }
}

/// Raw ticket handed to the caller plus the remaining rotation window.
#[derive(Debug)]
pub struct IssuedTicket {
    pub ticket_id: String,
    pub expires_in_seconds: i64,
}

/// The slice of an active ticket needed to rotate it.
#[derive(Debug)]
pub struct ActiveTicket {
    pub absolute_expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("reset ticket not found")]
    NotFound,
    #[error("reset ticket already used")]
    AlreadyUsed,
    #[error("reset ticket expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Rotation expiry clamped so it never outlives the absolute window.
#[must_use]
pub fn rotation_expiry(
    now: DateTime<Utc>,
    ticket_ttl: Duration,
    absolute_expires_at: DateTime<Utc>,
) -> DateTime<Utc> {
    let rotation = now + ticket_ttl;
    if rotation < absolute_expires_at {
        rotation
    } else {
        absolute_expires_at
    }
}

/// Whole seconds until `at`, floored at zero.
#[must_use]
pub fn seconds_until(now: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (at - now).num_seconds().max(0)
}

/// Create a raw ticket identifier. Only its hash is persisted.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate_ticket_id() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset ticket id")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a raw ticket for storage and lookup.
#[must_use]
pub fn hash_ticket_id(ticket_id: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(ticket_id.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn rotation_expiry_uses_ttl_inside_the_window() {
        let now = Utc::now();
        let absolute = now + Duration::hours(1);
        let expiry = rotation_expiry(now, Duration::minutes(15), absolute);
        assert_eq!(expiry, now + Duration::minutes(15));
    }

    #[test]
    fn rotation_expiry_is_clamped_to_the_absolute_window() {
        let now = Utc::now();
        let absolute = now + Duration::minutes(5);
        let expiry = rotation_expiry(now, Duration::minutes(15), absolute);
        assert_eq!(expiry, absolute);
    }

    #[test]
    fn rotation_never_extends_a_lapsed_window() {
        let now = Utc::now();
        let absolute = now - Duration::minutes(1);
        let expiry = rotation_expiry(now, Duration::minutes(15), absolute);
        assert_eq!(expiry, absolute);
        assert_eq!(seconds_until(now, expiry), 0);
    }

    #[test]
    fn seconds_until_floors_at_zero() {
        let now = Utc::now();
        assert_eq!(seconds_until(now, now - Duration::seconds(30)), 0);
        assert_eq!(seconds_until(now, now + Duration::seconds(90)), 90);
    }

    #[test]
    fn ticket_ids_are_32_random_bytes() {
        let first = generate_ticket_id().expect("rng");
        let second = generate_ticket_id().expect("rng");
        assert_ne!(first, second);
        let decoded = URL_SAFE_NO_PAD.decode(first.as_bytes()).expect("base64");
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn ticket_hash_is_stable_and_distinct() {
        assert_eq!(hash_ticket_id("ticket"), hash_ticket_id("ticket"));
        assert_ne!(hash_ticket_id("ticket"), hash_ticket_id("other"));
    }
}
