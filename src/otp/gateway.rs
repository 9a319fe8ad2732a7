//! Verification-channel gateway.
//!
//! The gateway owns code generation, delivery, and matching; this service only
//! asks it to start a verification for a destination and later to check a
//! submitted code. The production implementation talks to Twilio Verify.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

const DEFAULT_BASE_URL: &str = "https://verify.twilio.com/v2";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Sms,
    Email,
}

impl Channel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

/// Result of checking a submitted code against one destination.
///
/// `NotPending` means the gateway has no live verification for the
/// destination (never started, expired, or already consumed), which is
/// distinct from a live verification with the wrong code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Approved,
    Rejected,
    NotPending,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("verification channel refused dispatch: {0}")]
    Dispatch(String),
    #[error("verification channel transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait VerificationGateway: Send + Sync {
    /// Issue a fresh code to `destination` over `channel`.
    ///
    /// Repeated calls re-issue; the gateway keeps at most one live
    /// verification per destination.
    async fn start(&self, destination: &str, channel: Channel) -> Result<(), ChannelError>;

    /// Check a submitted code for `destination`, consuming it on success.
    async fn check(&self, destination: &str, code: &str) -> Result<CheckOutcome, ChannelError>;
}

/// Twilio Verify client.
#[derive(Clone)]
pub struct TwilioVerifyGateway {
    http: Client,
    base_url: String,
    account_sid: String,
    auth_token: SecretString,
    service_sid: String,
}

#[derive(Debug, Deserialize)]
struct VerificationStatus {
    status: String,
}

impl TwilioVerifyGateway {
    #[must_use]
    pub fn new(
        http: Client,
        account_sid: String,
        auth_token: SecretString,
        service_sid: String,
    ) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            account_sid,
            auth_token,
            service_sid,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, resource: &str) -> String {
        format!(
            "{}/Services/{}/{resource}",
            self.base_url, self.service_sid
        )
    }
}

#[async_trait]
impl VerificationGateway for TwilioVerifyGateway {
    async fn start(&self, destination: &str, channel: Channel) -> Result<(), ChannelError> {
        let mut form = HashMap::new();
        form.insert("To", destination.to_string());
        form.insert("Channel", channel.as_str().to_string());

        let response = self
            .http
            .post(self.url("Verifications"))
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Rate limits and malformed destinations come back as 4xx with a body
        // describing the refusal; keep it for the logs, not the caller.
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Dispatch(format!("{status}: {body}")))
    }

    async fn check(&self, destination: &str, code: &str) -> Result<CheckOutcome, ChannelError> {
        let mut form = HashMap::new();
        form.insert("To", destination);
        form.insert("Code", code);

        let response = self
            .http
            .post(self.url("VerificationCheck"))
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await?;

        // Twilio answers 404 (error 20404) when no verification is pending
        // for the destination: never started, expired, or already consumed.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(CheckOutcome::NotPending);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Dispatch(format!("{status}: {body}")));
        }

        let verification: VerificationStatus = response.json().await?;
        if verification.status == "approved" {
            Ok(CheckOutcome::Approved)
        } else {
            Ok(CheckOutcome::Rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_match_the_wire_format() {
        assert_eq!(Channel::Sms.as_str(), "sms");
        assert_eq!(Channel::Email.as_str(), "email");
    }

    #[test]
    fn url_joins_service_and_resource() {
        let gateway = TwilioVerifyGateway::new(
            Client::new(),
            "AC123".to_string(),
            SecretString::from("token".to_string()),
            "VA456".to_string(),
        )
        .with_base_url("https://verify.example.test/v2/".to_string());
        assert_eq!(
            gateway.url("VerificationCheck"),
            "https://verify.example.test/v2/Services/VA456/VerificationCheck"
        );
    }

    #[test]
    fn verification_status_parses() {
        let parsed: VerificationStatus =
            serde_json::from_str(r#"{"status":"approved","sid":"VE1"}"#).expect("valid payload");
        assert_eq!(parsed.status, "approved");
    }
}
