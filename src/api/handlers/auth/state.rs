//! Shared state threaded into every auth handler.

use crate::federated::{AppleVerifier, GoogleVerifier};
use crate::otp::Orchestrator;
use crate::tickets::TicketService;
use crate::token::TokenIssuer;

/// Everything the auth endpoints need beyond the connection pool.
///
/// Built once at startup from configuration; no handler reads the
/// environment directly.
pub struct AuthState {
    tokens: TokenIssuer,
    otp: Orchestrator,
    tickets: TicketService,
    google: GoogleVerifier,
    apple: AppleVerifier,
}

impl AuthState {
    #[must_use]
    pub fn new(
        tokens: TokenIssuer,
        otp: Orchestrator,
        tickets: TicketService,
        google: GoogleVerifier,
        apple: AppleVerifier,
    ) -> Self {
        Self {
            tokens,
            otp,
            tickets,
            google,
            apple,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[must_use]
    pub fn otp(&self) -> &Orchestrator {
        &self.otp
    }

    #[must_use]
    pub fn tickets(&self) -> &TicketService {
        &self.tickets
    }

    #[must_use]
    pub fn google(&self) -> &GoogleVerifier {
        &self.google
    }

    #[must_use]
    pub fn apple(&self) -> &AppleVerifier {
        &self.apple
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AuthState;
    use crate::federated::{AppleVerifier, GoogleVerifier, JwksCache, APPLE_JWKS_URL, GOOGLE_JWKS_URL};
    use crate::otp::testing::ScriptedGateway;
    use crate::otp::{CheckOutcome, Orchestrator};
    use crate::tickets::{TicketPolicy, TicketService};
    use crate::token::TokenIssuer;
    use secrecy::SecretString;
    use std::sync::Arc;

    /// State for handler tests that never reach the gateway or a provider.
    pub(crate) fn auth_state(outcomes: Vec<CheckOutcome>) -> Arc<AuthState> {
        let secret = SecretString::from("test-secret".to_string());
        let http = reqwest::Client::new();
        Arc::new(AuthState::new(
            TokenIssuer::new(&secret, 0, 900),
            Orchestrator::new(Arc::new(ScriptedGateway::new(outcomes))),
            TicketService::new(TicketPolicy::from_minutes(15, 60)),
            GoogleVerifier::new(
                "test-client".to_string(),
                JwksCache::new(http.clone(), GOOGLE_JWKS_URL.to_string()),
            ),
            AppleVerifier::new(
                "fm.encore.app".to_string(),
                JwksCache::new(http, APPLE_JWKS_URL.to_string()),
            ),
        ))
    }
}
