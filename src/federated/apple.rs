//! Apple identity-token verification with nonce binding.

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::jwks::JwksCache;
use super::{Provider, ProviderError, VerifiedIdentity};

pub const APPLE_JWKS_URL: &str = "https://appleid.apple.com/auth/keys";
const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Apple sends `email_verified` as a bool or the string `"true"` depending
/// on the token vintage.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmailVerified {
    Bool(bool),
    Text(String),
}

impl EmailVerified {
    fn is_true(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(value) => value == "true",
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppleClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<EmailVerified>,
    nonce: Option<String>,
}

pub struct AppleVerifier {
    audience: String,
    jwks: JwksCache,
}

impl AppleVerifier {
    #[must_use]
    pub fn new(audience: String, jwks: JwksCache) -> Self {
        Self { audience, jwks }
    }

    /// Verify an Apple identity token and bind it to the sign-in attempt.
    ///
    /// The token's `nonce` claim must equal the SHA-256 digest of the raw
    /// nonce the client generated for this attempt; this stops a captured
    /// token from being replayed in a different sign-in.
    ///
    /// # Errors
    /// Returns `NonceMismatch` when the digest check fails, otherwise the
    /// usual signature/issuer/audience/expiry failures.
    pub async fn verify(
        &self,
        identity_token: &str,
        raw_nonce: &str,
    ) -> Result<VerifiedIdentity, ProviderError> {
        let header = decode_header(identity_token)?;
        let kid = header.kid.ok_or(ProviderError::MissingKeyId)?;
        let key = self.jwks.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[APPLE_ISSUER]);

        let claims = decode::<AppleClaims>(identity_token, &key, &validation)?.claims;

        let expected = nonce_digest(raw_nonce);
        if claims.nonce.as_deref() != Some(expected.as_str()) {
            return Err(ProviderError::NonceMismatch);
        }

        Ok(identity_from_claims(claims))
    }
}

fn identity_from_claims(claims: AppleClaims) -> VerifiedIdentity {
    let verified_email = if claims.email_verified.is_some_and(|v| v.is_true()) {
        claims.email
    } else {
        // Apple may relay a private or unverified address; never match on it.
        None
    };
    VerifiedIdentity {
        provider: Provider::Apple,
        provider_user_id: claims.sub,
        verified_email,
        given_name: None,
        family_name: None,
    }
}

/// Lowercase hex SHA-256, the digest form Apple expects in the nonce claim.
fn nonce_digest(raw_nonce: &str) -> String {
    let digest = Sha256::digest(raw_nonce.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_digest_is_lowercase_hex_sha256() {
        // SHA-256 of the empty string, a fixed vector.
        assert_eq!(
            nonce_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            nonce_digest("nonce-1"),
            nonce_digest("nonce-1"),
        );
        assert_ne!(nonce_digest("nonce-1"), nonce_digest("nonce-2"));
    }

    #[test]
    fn email_verified_accepts_bool_and_string_forms() {
        let claims: AppleClaims = serde_json::from_str(
            r#"{"sub":"a-1","email":"a@example.com","email_verified":"true","nonce":"n"}"#,
        )
        .expect("valid claims");
        assert_eq!(
            identity_from_claims(claims).verified_email.as_deref(),
            Some("a@example.com")
        );

        let claims: AppleClaims = serde_json::from_str(
            r#"{"sub":"a-1","email":"a@example.com","email_verified":true,"nonce":"n"}"#,
        )
        .expect("valid claims");
        assert_eq!(
            identity_from_claims(claims).verified_email.as_deref(),
            Some("a@example.com")
        );
    }

    #[test]
    fn unverified_or_missing_email_is_discarded() {
        let claims: AppleClaims = serde_json::from_str(
            r#"{"sub":"a-2","email":"relay@privaterelay.appleid.com","email_verified":"false"}"#,
        )
        .expect("valid claims");
        assert_eq!(identity_from_claims(claims).verified_email, None);

        let claims: AppleClaims =
            serde_json::from_str(r#"{"sub":"a-3"}"#).expect("valid claims");
        let identity = identity_from_claims(claims);
        assert_eq!(identity.verified_email, None);
        assert_eq!(identity.provider, Provider::Apple);
    }
}
