//! # Encore Identity Service
//!
//! `encore` is the identity and session backend for the Encore music app:
//! account signup with two-channel OTP verification, password and
//! passwordless login, federated sign-in (Google and Apple), and a
//! password-reset flow built on short-lived, single-use reset tickets.
//!
//! ## OTP verification
//!
//! Codes are issued and checked by an external verification gateway. A
//! submitted code is checked against the SMS channel first and falls back to
//! the email channel only when SMS reports no pending verification; a wrong
//! code on a live verification fails immediately.
//!
//! ## Reset tickets
//!
//! A verified reset OTP yields a random, single-use ticket bounded by two
//! expiries: a renewable rotation window and a hard absolute window fixed at
//! first issuance. Re-verifying while a ticket is live rotates it (new id,
//! fresh rotation window) without extending the absolute deadline.
//!
//! ## Sessions
//!
//! Successful flows end with a signed bearer token. Password/OTP sign-ins
//! and federated sign-ins use independently configured token lifetimes.

pub mod api;
pub mod cli;
pub mod federated;
pub mod otp;
pub mod tickets;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
