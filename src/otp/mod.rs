//! OTP issuance and the two-channel fallback check.

pub mod gateway;

pub use gateway::{Channel, ChannelError, CheckOutcome, TwilioVerifyGateway, VerificationGateway};

use std::sync::Arc;
use tracing::debug;

/// Drives OTP starts and the SMS-then-email verification check.
///
/// Stateless: every pending code lives in the gateway.
#[derive(Clone)]
pub struct Orchestrator {
    gateway: Arc<dyn VerificationGateway>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(gateway: Arc<dyn VerificationGateway>) -> Self {
        Self { gateway }
    }

    /// Issue a code to one destination over one channel.
    ///
    /// # Errors
    /// Returns `ChannelError` if the gateway cannot dispatch.
    pub async fn start(&self, destination: &str, channel: Channel) -> Result<(), ChannelError> {
        self.gateway.start(destination, channel).await
    }

    /// Check a submitted code against the SMS channel first, falling back to
    /// the email channel only when SMS has no pending verification.
    ///
    /// A wrong code on a live SMS verification fails immediately: falling
    /// back there would leak whether a code is pending on the other channel.
    ///
    /// # Errors
    /// Returns `ChannelError` if a gateway call fails outright.
    pub async fn verify(
        &self,
        mobile: &str,
        email: Option<&str>,
        code: &str,
    ) -> Result<bool, ChannelError> {
        match self.gateway.check(mobile, code).await? {
            CheckOutcome::Approved => Ok(true),
            CheckOutcome::Rejected => Ok(false),
            CheckOutcome::NotPending => {
                let Some(email) = email else {
                    return Ok(false);
                };
                debug!("no pending SMS verification, trying email channel");
                Ok(self.gateway.check(email, code).await? == CheckOutcome::Approved)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::gateway::{Channel, ChannelError, CheckOutcome, VerificationGateway};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Gateway double that replays scripted outcomes and records the
    /// destinations it was asked to check.
    pub(crate) struct ScriptedGateway {
        outcomes: Mutex<Vec<CheckOutcome>>,
        pub(crate) checked: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        pub(crate) fn new(outcomes: Vec<CheckOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                checked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VerificationGateway for ScriptedGateway {
        async fn start(&self, _destination: &str, _channel: Channel) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn check(
            &self,
            destination: &str,
            _code: &str,
        ) -> Result<CheckOutcome, ChannelError> {
            self.checked
                .lock()
                .expect("lock")
                .push(destination.to_string());
            let mut outcomes = self.outcomes.lock().expect("lock");
            if outcomes.is_empty() {
                return Err(ChannelError::Dispatch("script exhausted".to_string()));
            }
            Ok(outcomes.remove(0))
        }
    }
}
