//! Fetch-and-cache for provider JWKS documents.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::ProviderError;

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

struct CachedKeys {
    fetched_at: Instant,
    keys: JwkSet,
}

/// Remote key set cached in-process.
///
/// Keys are refetched when the cache ages out or when a token references a
/// `kid` the cache has never seen (providers rotate keys without notice).
pub struct JwksCache {
    http: Client,
    url: String,
    refresh_interval: Duration,
    cached: Mutex<Option<CachedKeys>>,
}

impl JwksCache {
    #[must_use]
    pub fn new(http: Client, url: String) -> Self {
        Self {
            http,
            url,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            cached: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Resolve the decoding key for a token's `kid`.
    ///
    /// # Errors
    /// Returns `Keys` on fetch failure, `UnknownKey` if the provider does not
    /// publish the requested key, or `Token` if the JWK cannot be converted.
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, ProviderError> {
        let mut cached = self.cached.lock().await;

        let stale = match cached.as_ref() {
            Some(entry) => {
                entry.fetched_at.elapsed() > self.refresh_interval
                    || entry.keys.find(kid).is_none()
            }
            None => true,
        };

        if stale {
            debug!(url = %self.url, "refreshing provider key set");
            let keys: JwkSet = self
                .http
                .get(&self.url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            *cached = Some(CachedKeys {
                fetched_at: Instant::now(),
                keys,
            });
        }

        let entry = cached.as_ref().ok_or(ProviderError::UnknownKey)?;
        let jwk = entry.keys.find(kid).ok_or(ProviderError::UnknownKey)?;
        Ok(DecodingKey::from_jwk(jwk)?)
    }
}
