//! Token, reset-ticket, federated-provider, and outbox arguments.

use anyhow::{Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_SESSION_TOKEN_TTL: &str = "session-token-ttl-seconds";
pub const ARG_FEDERATED_TOKEN_TTL: &str = "federated-token-ttl-seconds";
pub const ARG_TICKET_TTL_MINUTES: &str = "reset-ticket-ttl-minutes";
pub const ARG_ABSOLUTE_WINDOW_MINUTES: &str = "reset-absolute-window-minutes";
pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_APPLE_BUNDLE_ID: &str = "apple-bundle-id";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_ticket_args(command);
    let command = with_provider_args(command);
    with_outbox_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret for session tokens")
                .env("ENCORE_JWT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TOKEN_TTL)
                .long(ARG_SESSION_TOKEN_TTL)
                .help("Session-token TTL in seconds after password/OTP sign-in (0 = no expiry)")
                .env("ENCORE_SESSION_TOKEN_TTL_SECONDS")
                .default_value("0")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FEDERATED_TOKEN_TTL)
                .long(ARG_FEDERATED_TOKEN_TTL)
                .help("Session-token TTL in seconds after federated sign-in")
                .env("ENCORE_FEDERATED_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_ticket_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TICKET_TTL_MINUTES)
                .long(ARG_TICKET_TTL_MINUTES)
                .help("Rotation window of a reset ticket, in minutes")
                .env("ENCORE_RESET_TICKET_TTL_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_ABSOLUTE_WINDOW_MINUTES)
                .long(ARG_ABSOLUTE_WINDOW_MINUTES)
                .help("Absolute window of a reset episode, in minutes")
                .env("ENCORE_RESET_ABSOLUTE_WINDOW_MINUTES")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_provider_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Audience expected in Google id tokens")
                .env("ENCORE_GOOGLE_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_APPLE_BUNDLE_ID)
                .long(ARG_APPLE_BUNDLE_ID)
                .help("Audience (bundle id) expected in Apple identity tokens")
                .env("ENCORE_APPLE_BUNDLE_ID")
                .required(true),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("ENCORE_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("ENCORE_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("ENCORE_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("ENCORE_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("ENCORE_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: i64,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

pub struct Options {
    pub jwt_secret: SecretString,
    pub session_token_ttl_seconds: i64,
    pub federated_token_ttl_seconds: i64,
    pub ticket_ttl_minutes: i64,
    pub absolute_window_minutes: i64,
    pub google_client_id: String,
    pub apple_bundle_id: String,
    pub outbox: OutboxOptions,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --jwt-secret")?;
        let google_client_id = matches
            .get_one::<String>(ARG_GOOGLE_CLIENT_ID)
            .cloned()
            .context("missing required argument: --google-client-id")?;
        let apple_bundle_id = matches
            .get_one::<String>(ARG_APPLE_BUNDLE_ID)
            .cloned()
            .context("missing required argument: --apple-bundle-id")?;

        Ok(Self {
            jwt_secret,
            session_token_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TOKEN_TTL)
                .copied()
                .unwrap_or(0),
            federated_token_ttl_seconds: matches
                .get_one::<i64>(ARG_FEDERATED_TOKEN_TTL)
                .copied()
                .unwrap_or(900),
            ticket_ttl_minutes: matches
                .get_one::<i64>(ARG_TICKET_TTL_MINUTES)
                .copied()
                .unwrap_or(15),
            absolute_window_minutes: matches
                .get_one::<i64>(ARG_ABSOLUTE_WINDOW_MINUTES)
                .copied()
                .unwrap_or(60),
            google_client_id,
            apple_bundle_id,
            outbox: OutboxOptions {
                poll_seconds: matches
                    .get_one::<u64>("email-outbox-poll-seconds")
                    .copied()
                    .unwrap_or(5),
                batch_size: matches
                    .get_one::<i64>("email-outbox-batch-size")
                    .copied()
                    .unwrap_or(10),
                max_attempts: matches
                    .get_one::<u32>("email-outbox-max-attempts")
                    .copied()
                    .unwrap_or(5),
                backoff_base_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-base-seconds")
                    .copied()
                    .unwrap_or(5),
                backoff_max_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-max-seconds")
                    .copied()
                    .unwrap_or(300),
            },
        })
    }
}
