//! Map validated CLI arguments to an action.

use crate::cli::actions::{server, Action};
use crate::cli::commands::{auth, verify};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let verify_opts = verify::Options::parse(matches)?;

    Ok(Action::Server(server::Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        session_token_ttl_seconds: auth_opts.session_token_ttl_seconds,
        federated_token_ttl_seconds: auth_opts.federated_token_ttl_seconds,
        ticket_ttl_minutes: auth_opts.ticket_ttl_minutes,
        absolute_window_minutes: auth_opts.absolute_window_minutes,
        google_client_id: auth_opts.google_client_id,
        apple_bundle_id: auth_opts.apple_bundle_id,
        verify_account_sid: verify_opts.account_sid,
        verify_auth_token: verify_opts.auth_token,
        verify_service_sid: verify_opts.service_sid,
        email_outbox_poll_seconds: auth_opts.outbox.poll_seconds,
        email_outbox_batch_size: auth_opts.outbox.batch_size,
        email_outbox_max_attempts: auth_opts.outbox.max_attempts,
        email_outbox_backoff_base_seconds: auth_opts.outbox.backoff_base_seconds,
        email_outbox_backoff_max_seconds: auth_opts.outbox.backoff_max_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_args() {
        temp_env::with_vars(
            [
                ("ENCORE_PORT", None::<&str>),
                ("ENCORE_DSN", Some("postgres://localhost:5432/encore")),
                ("ENCORE_JWT_SECRET", Some("secret")),
                ("ENCORE_GOOGLE_CLIENT_ID", Some("client-id")),
                ("ENCORE_APPLE_BUNDLE_ID", Some("fm.encore.app")),
                ("ENCORE_VERIFY_ACCOUNT_SID", Some("AC123")),
                ("ENCORE_VERIFY_AUTH_TOKEN", Some("token")),
                ("ENCORE_VERIFY_SERVICE_SID", Some("VA456")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["encore"]);
                let action = handler(&matches).expect("valid action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://localhost:5432/encore");
                assert_eq!(args.jwt_secret.expose_secret(), "secret");
                assert_eq!(args.ticket_ttl_minutes, 15);
                assert_eq!(args.absolute_window_minutes, 60);
                assert_eq!(args.federated_token_ttl_seconds, 900);
                assert_eq!(args.verify_service_sid, "VA456");
            },
        );
    }
}
