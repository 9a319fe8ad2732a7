//! Welcome-email outbox worker.
//!
//! Signup verification enqueues a row in `email_outbox` inside its own
//! transaction; delivery happens out-of-band here. The worker polls for
//! pending rows, locks a batch with `FOR UPDATE SKIP LOCKED` so several
//! instances can drain the same table, and hands each row to an
//! [`EmailSender`]. Failures retry with exponential backoff and jitter
//! until `max_attempts`, then the row is parked as `failed`. Delivery
//! failures never reach the signup caller.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct OutboundEmail {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Delivery seam. Implementations decide the transport (SMTP, API, ...).
pub trait EmailSender: Send + Sync {
    /// Deliver one message; an `Err` schedules a retry.
    fn send(&self, message: &OutboundEmail) -> Result<()>;
}

/// Default sender for local development: log and succeed.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &OutboundEmail) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl OutboxConfig {
    #[must_use]
    pub fn from_seconds(
        poll_seconds: u64,
        batch_size: i64,
        max_attempts: u32,
        backoff_base_seconds: u64,
        backoff_max_seconds: u64,
    ) -> Self {
        Self {
            poll_interval: Duration::from_secs(poll_seconds.max(1)),
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
            backoff_base: Duration::from_secs(backoff_base_seconds.max(1)),
            backoff_max: Duration::from_secs(backoff_max_seconds.max(backoff_base_seconds).max(1)),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::from_seconds(5, 10, 5, 5, 300)
    }
}

/// Spawn the polling loop.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: OutboxConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = drain_batch(&pool, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err}");
            }
            sleep(config.poll_interval).await;
        }
    })
}

async fn drain_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &OutboxConfig,
) -> Result<usize> {
    let mut tx = pool.begin().await.context("begin outbox transaction")?;

    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let rows = sqlx::query(query)
        .bind(config.batch_size)
        .fetch_all(&mut *tx)
        .await
        .context("failed to load outbox batch")?;

    let drained = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let message = OutboundEmail {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };
        let outcome = sender.send(&message);
        settle(&mut tx, id, u32::try_from(attempts).unwrap_or(0) + 1, outcome, config).await?;
    }

    tx.commit().await.context("commit outbox batch")?;
    Ok(drained)
}

async fn settle(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    attempts: u32,
    outcome: Result<()>,
    config: &OutboxConfig,
) -> Result<()> {
    let attempts_i32 = i32::try_from(attempts).unwrap_or(i32::MAX);
    match outcome {
        Ok(()) => {
            sqlx::query(
                r"
                UPDATE email_outbox
                SET status = 'sent', attempts = $2, last_error = NULL, sent_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(attempts_i32)
            .execute(&mut **tx)
            .await
            .context("failed to mark outbox row sent")?;
        }
        Err(err) if attempts >= config.max_attempts => {
            sqlx::query(
                r"
                UPDATE email_outbox
                SET status = 'failed', attempts = $2, last_error = $3
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(attempts_i32)
            .bind(err.to_string())
            .execute(&mut **tx)
            .await
            .context("failed to mark outbox row failed")?;
        }
        Err(err) => {
            let delay = backoff_delay(attempts, config.backoff_base, config.backoff_max);
            let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
            sqlx::query(
                r"
                UPDATE email_outbox
                SET attempts = $2, last_error = $3,
                    next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(attempts_i32)
            .bind(err.to_string())
            .bind(delay_ms)
            .execute(&mut **tx)
            .await
            .context("failed to reschedule outbox row")?;
        }
    }
    Ok(())
}

/// Exponential backoff capped at `max`, with half-window jitter so parked
/// rows do not stampede back in lockstep.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let exponential = base.checked_mul(1u32 << shift).unwrap_or(max).min(max);
    let millis = u64::try_from(exponential.as_millis()).unwrap_or(u64::MAX);
    if millis < 2 {
        return exponential;
    }
    let half = millis / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        for attempt in 1..=10 {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay <= max, "attempt {attempt} exceeded the cap");
        }
        // Tenth attempt is far past the cap: jitter keeps it above half.
        assert!(backoff_delay(10, base, max) >= max / 2);
    }

    #[test]
    fn config_floors_degenerate_values() {
        let config = OutboxConfig::from_seconds(0, 0, 0, 0, 0);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_attempts, 1);
        assert!(config.backoff_max >= config.backoff_base);
    }

    #[test]
    fn log_sender_always_succeeds() {
        let message = OutboundEmail {
            to_email: "a@example.com".to_string(),
            template: "welcome".to_string(),
            payload_json: "{}".to_string(),
        };
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
