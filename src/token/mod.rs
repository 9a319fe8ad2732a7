//! Signed bearer tokens handed out after a successful sign-in.
//!
//! Two issuance profiles exist: the password/OTP profile (long-lived, binds
//! the account email into the claims) and the federated profile (short-lived,
//! id-only). Their lifetimes are configured independently; a TTL of zero
//! means the token carries no `exp` claim at all.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Account id as a string.
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl_seconds: i64,
    federated_ttl_seconds: i64,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        secret: &SecretString,
        session_ttl_seconds: i64,
        federated_ttl_seconds: i64,
    ) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            session_ttl_seconds,
            federated_ttl_seconds,
        }
    }

    /// Token minted after a password or OTP sign-in.
    ///
    /// Carries the account email when one is on file. A zero TTL omits `exp`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn session_token(&self, account_id: Uuid, email: Option<&str>) -> Result<String> {
        self.sign(account_id, email, self.session_ttl_seconds)
    }

    /// Short-lived token minted after a federated sign-in.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn federated_token(&self, account_id: Uuid) -> Result<String> {
        self.sign(account_id, None, self.federated_ttl_seconds)
    }

    fn sign(&self, account_id: Uuid, email: Option<&str>, ttl_seconds: i64) -> Result<String> {
        let now = Utc::now();
        let exp = if ttl_seconds == 0 {
            None
        } else {
            Some(now.timestamp() + ttl_seconds)
        };
        let claims = Claims {
            sub: account_id.to_string(),
            email: email.map(str::to_string),
            iat: now.timestamp(),
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key).context("failed to sign token")
    }

    /// Decode and validate a token previously issued by this service.
    ///
    /// # Errors
    /// Returns an error if the signature is invalid or the token is expired.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        // The password/OTP profile may omit `exp`; expiry is still enforced
        // whenever the claim is present.
        validation.required_spec_claims.clear();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .context("invalid token")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn issuer(session_ttl: i64, federated_ttl: i64) -> TokenIssuer {
        let secret = SecretString::from("test-secret".to_string());
        TokenIssuer::new(&secret, session_ttl, federated_ttl)
    }

    #[test]
    fn session_token_without_ttl_has_no_exp() -> Result<()> {
        let issuer = issuer(0, 900);
        let account_id = Uuid::new_v4();
        let token = issuer.session_token(account_id, Some("alice@example.com"))?;
        let claims = issuer.verify(&token)?;
        assert_eq!(claims.sub, account_id.to_string());
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert_eq!(claims.exp, None);
        Ok(())
    }

    #[test]
    fn session_token_with_ttl_expires() -> Result<()> {
        let issuer = issuer(3600, 900);
        let token = issuer.session_token(Uuid::new_v4(), None)?;
        let claims = issuer.verify(&token)?;
        let exp = claims.exp.expect("exp should be set");
        assert!(exp > Utc::now().timestamp());
        assert!(exp <= Utc::now().timestamp() + 3600);
        Ok(())
    }

    #[test]
    fn federated_token_is_short_lived_and_id_only() -> Result<()> {
        let issuer = issuer(0, 900);
        let account_id = Uuid::new_v4();
        let token = issuer.federated_token(account_id)?;
        let claims = issuer.verify(&token)?;
        assert_eq!(claims.sub, account_id.to_string());
        assert_eq!(claims.email, None);
        let exp = claims.exp.expect("exp should be set");
        assert!(exp <= Utc::now().timestamp() + 900);
        Ok(())
    }

    #[test]
    fn verify_rejects_foreign_signature() -> Result<()> {
        let token = issuer(0, 900).session_token(Uuid::new_v4(), None)?;
        let other = TokenIssuer::new(&SecretString::from("other".to_string()), 0, 900);
        assert!(other.verify(&token).is_err());
        Ok(())
    }

    #[test]
    fn verify_rejects_expired_token() -> Result<()> {
        // Negative TTL forces an exp in the past.
        let issuer = issuer(-3600, 900);
        let token = issuer.session_token(Uuid::new_v4(), None)?;
        assert!(issuer.verify(&token).is_err());
        Ok(())
    }
}
