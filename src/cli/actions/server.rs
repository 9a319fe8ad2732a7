//! Server action: wire configuration into the running service.

use crate::api::{self, OutboxConfig};
use crate::api::handlers::AuthState;
use crate::federated::{
    AppleVerifier, GoogleVerifier, JwksCache, APPLE_JWKS_URL, GOOGLE_JWKS_URL,
};
use crate::otp::{Orchestrator, TwilioVerifyGateway};
use crate::tickets::{TicketPolicy, TicketService};
use crate::token::TokenIssuer;
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub session_token_ttl_seconds: i64,
    pub federated_token_ttl_seconds: i64,
    pub ticket_ttl_minutes: i64,
    pub absolute_window_minutes: i64,
    pub google_client_id: String,
    pub apple_bundle_id: String,
    pub verify_account_sid: String,
    pub verify_auth_token: SecretString,
    pub verify_service_sid: String,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: i64,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built or the server fails
/// to start.
pub async fn execute(args: Args) -> Result<()> {
    // One client for every outbound call: the verification gateway and both
    // provider JWKS endpoints. These are the only unbounded-latency
    // dependencies, so they get a request timeout here.
    let http = reqwest::Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let gateway = TwilioVerifyGateway::new(
        http.clone(),
        args.verify_account_sid,
        args.verify_auth_token,
        args.verify_service_sid,
    );

    let auth_state = Arc::new(AuthState::new(
        TokenIssuer::new(
            &args.jwt_secret,
            args.session_token_ttl_seconds,
            args.federated_token_ttl_seconds,
        ),
        Orchestrator::new(Arc::new(gateway)),
        TicketService::new(TicketPolicy::from_minutes(
            args.ticket_ttl_minutes,
            args.absolute_window_minutes,
        )),
        GoogleVerifier::new(
            args.google_client_id,
            JwksCache::new(http.clone(), GOOGLE_JWKS_URL.to_string()),
        ),
        AppleVerifier::new(
            args.apple_bundle_id,
            JwksCache::new(http, APPLE_JWKS_URL.to_string()),
        ),
    ));

    let outbox_config = OutboxConfig::from_seconds(
        args.email_outbox_poll_seconds,
        args.email_outbox_batch_size,
        args.email_outbox_max_attempts,
        args.email_outbox_backoff_base_seconds,
        args.email_outbox_backoff_max_seconds,
    );

    api::new(args.port, args.dsn, auth_state, outbox_config).await
}
