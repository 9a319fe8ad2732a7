//! Verification-gateway (Twilio Verify) arguments.

use anyhow::{Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;

pub const ARG_VERIFY_ACCOUNT_SID: &str = "verify-account-sid";
pub const ARG_VERIFY_AUTH_TOKEN: &str = "verify-auth-token";
pub const ARG_VERIFY_SERVICE_SID: &str = "verify-service-sid";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERIFY_ACCOUNT_SID)
                .long(ARG_VERIFY_ACCOUNT_SID)
                .help("Twilio account SID for the Verify service")
                .env("ENCORE_VERIFY_ACCOUNT_SID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_VERIFY_AUTH_TOKEN)
                .long(ARG_VERIFY_AUTH_TOKEN)
                .help("Twilio auth token for the Verify service")
                .env("ENCORE_VERIFY_AUTH_TOKEN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_VERIFY_SERVICE_SID)
                .long(ARG_VERIFY_SERVICE_SID)
                .help("Twilio Verify service SID")
                .env("ENCORE_VERIFY_SERVICE_SID")
                .required(true),
        )
}

pub struct Options {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub service_sid: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let account_sid = matches
            .get_one::<String>(ARG_VERIFY_ACCOUNT_SID)
            .cloned()
            .context("missing required argument: --verify-account-sid")?;
        let auth_token = matches
            .get_one::<String>(ARG_VERIFY_AUTH_TOKEN)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --verify-auth-token")?;
        let service_sid = matches
            .get_one::<String>(ARG_VERIFY_SERVICE_SID)
            .cloned()
            .context("missing required argument: --verify-service-sid")?;
        Ok(Self {
            account_sid,
            auth_token,
            service_sid,
        })
    }
}
