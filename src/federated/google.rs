//! Google id-token verification.

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;

use super::jwks::JwksCache;
use super::{Provider, ProviderError, VerifiedIdentity};

pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
// Google signs with either issuer form depending on the client library.
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    given_name: Option<String>,
    family_name: Option<String>,
}

pub struct GoogleVerifier {
    audience: String,
    jwks: JwksCache,
}

impl GoogleVerifier {
    #[must_use]
    pub fn new(audience: String, jwks: JwksCache) -> Self {
        Self { audience, jwks }
    }

    /// Verify a Google-issued id token and extract the asserted identity.
    ///
    /// # Errors
    /// Returns `ProviderError` when the signature, issuer, audience, or
    /// expiry check fails, or when key material cannot be resolved.
    pub async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, ProviderError> {
        let header = decode_header(id_token)?;
        let kid = header.kid.ok_or(ProviderError::MissingKeyId)?;
        let key = self.jwks.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = decode::<GoogleClaims>(id_token, &key, &validation)?.claims;
        Ok(identity_from_claims(claims))
    }
}

fn identity_from_claims(claims: GoogleClaims) -> VerifiedIdentity {
    // Only an email Google asserts as verified may be used for matching.
    let verified_email = if claims.email_verified {
        claims.email
    } else {
        None
    };
    VerifiedIdentity {
        provider: Provider::Google,
        provider_user_id: claims.sub,
        verified_email,
        given_name: claims.given_name,
        family_name: claims.family_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_email_is_carried_through() {
        let claims: GoogleClaims = serde_json::from_str(
            r#"{"sub":"g-1","email":"a@example.com","email_verified":true,"given_name":"A"}"#,
        )
        .expect("valid claims");
        let identity = identity_from_claims(claims);
        assert_eq!(identity.provider, Provider::Google);
        assert_eq!(identity.provider_user_id, "g-1");
        assert_eq!(identity.verified_email.as_deref(), Some("a@example.com"));
        assert_eq!(identity.given_name.as_deref(), Some("A"));
    }

    #[test]
    fn unverified_email_is_discarded() {
        let claims: GoogleClaims = serde_json::from_str(
            r#"{"sub":"g-2","email":"a@example.com","email_verified":false}"#,
        )
        .expect("valid claims");
        assert_eq!(identity_from_claims(claims).verified_email, None);
    }

    #[test]
    fn missing_email_verified_defaults_to_unverified() {
        let claims: GoogleClaims =
            serde_json::from_str(r#"{"sub":"g-3","email":"a@example.com"}"#).expect("valid claims");
        assert_eq!(identity_from_claims(claims).verified_email, None);
    }
}
