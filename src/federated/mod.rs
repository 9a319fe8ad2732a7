//! Federated sign-in: provider token verification and identity extraction.
//!
//! Each provider module verifies an externally-issued token against the
//! provider's published keys and distills it into a [`VerifiedIdentity`].
//! Resolution against local accounts lives with the account storage layer.

mod apple;
mod google;
mod jwks;

pub use apple::{AppleVerifier, APPLE_JWKS_URL};
pub use google::{GoogleVerifier, GOOGLE_JWKS_URL};
pub use jwks::JwksCache;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Google,
    Apple,
}

impl Provider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
        }
    }
}

/// Identity asserted by a verified provider token.
///
/// `verified_email` is only populated when the provider itself asserts the
/// address as verified; an unverified address must never reach account
/// matching.
#[derive(Debug)]
pub struct VerifiedIdentity {
    pub provider: Provider,
    pub provider_user_id: String,
    pub verified_email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to fetch provider keys: {0}")]
    Keys(#[from] reqwest::Error),
    #[error("token references an unknown signing key")]
    UnknownKey,
    #[error("token header carries no key id")]
    MissingKeyId,
    #[error("invalid provider token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("nonce does not match the token claim")]
    NonceMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_match_stored_identities() {
        assert_eq!(Provider::Google.as_str(), "google");
        assert_eq!(Provider::Apple.as_str(), "apple");
    }
}
