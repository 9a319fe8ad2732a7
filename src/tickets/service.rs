//! Reset-ticket lifecycle: issue, rotate, consume.
//!
//! A reset episode starts with a verified OTP and ends when a ticket is
//! consumed or the absolute window lapses. Rotation refreshes the short
//! window without a new OTP but never moves the absolute deadline; delete
//! and insert run in one transaction so a concurrent consume sees either
//! the old ticket or the new one, never both.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{
    generate_ticket_id, hash_ticket_id, rotation_expiry, seconds_until, ActiveTicket,
    IssuedTicket, TicketError, TicketPolicy, PURPOSE_RESET_PASSWORD,
};
use super::repo;

#[derive(Clone, Copy, Debug)]
pub struct TicketService {
    policy: TicketPolicy,
}

impl TicketService {
    #[must_use]
    pub fn new(policy: TicketPolicy) -> Self {
        Self { policy }
    }

    /// Look up a live, unused ticket for the account.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn find_active(
        &self,
        pool: &PgPool,
        account_id: Uuid,
    ) -> Result<Option<ActiveTicket>> {
        repo::find_active(pool, account_id, PURPOSE_RESET_PASSWORD, Utc::now()).await
    }

    /// Drop every ticket for the account, live or stale.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn purge(&self, pool: &PgPool, account_id: Uuid) -> Result<()> {
        repo::purge_for_account(pool, account_id, PURPOSE_RESET_PASSWORD).await
    }

    /// First ticket of a reset episode; fixes the absolute deadline.
    ///
    /// # Errors
    /// Returns an error on store or RNG failure.
    pub async fn issue(&self, pool: &PgPool, account_id: Uuid) -> Result<IssuedTicket> {
        let now = Utc::now();
        let absolute_expires_at = now + self.policy.absolute_window;
        self.replace(pool, account_id, absolute_expires_at).await
    }

    /// Fresh ticket for an episode already in flight.
    ///
    /// The caller passes through the episode's original absolute deadline;
    /// the new rotation window is clamped against it.
    ///
    /// # Errors
    /// Returns an error on store or RNG failure.
    pub async fn rotate(
        &self,
        pool: &PgPool,
        account_id: Uuid,
        active: &ActiveTicket,
    ) -> Result<IssuedTicket> {
        self.replace(pool, account_id, active.absolute_expires_at)
            .await
    }

    async fn replace(
        &self,
        pool: &PgPool,
        account_id: Uuid,
        absolute_expires_at: chrono::DateTime<Utc>,
    ) -> Result<IssuedTicket> {
        let now = Utc::now();
        let expires_at = rotation_expiry(now, self.policy.ticket_ttl, absolute_expires_at);
        let ticket_id = generate_ticket_id()?;
        let ticket_hash = hash_ticket_id(&ticket_id);

        let mut tx = pool.begin().await.context("begin ticket transaction")?;
        repo::delete_for_account(&mut tx, account_id, PURPOSE_RESET_PASSWORD).await?;
        repo::insert(
            &mut tx,
            &ticket_hash,
            account_id,
            PURPOSE_RESET_PASSWORD,
            expires_at,
            absolute_expires_at,
        )
        .await?;
        tx.commit().await.context("commit ticket transaction")?;

        Ok(IssuedTicket {
            ticket_id,
            expires_in_seconds: seconds_until(now, expires_at),
        })
    }

    /// Consume a ticket and apply the new password hash.
    ///
    /// Exactly one consume can succeed per ticket; unused siblings are
    /// purged in the same transaction so none of them can be replayed.
    ///
    /// # Errors
    /// `NotFound`, `AlreadyUsed` and `Expired` report the ticket state;
    /// `Store` wraps database failures.
    pub async fn consume(
        &self,
        pool: &PgPool,
        ticket_id: &str,
        new_password_hash: &str,
    ) -> Result<Uuid, TicketError> {
        let ticket_hash = hash_ticket_id(ticket_id);

        let mut tx = pool.begin().await?;
        let Some(ticket) = repo::lock_by_hash(&mut tx, &ticket_hash).await? else {
            return Err(TicketError::NotFound);
        };
        if ticket.used {
            return Err(TicketError::AlreadyUsed);
        }
        if Utc::now() >= ticket.expires_at {
            return Err(TicketError::Expired);
        }

        repo::update_password(&mut tx, ticket.account_id, new_password_hash).await?;
        repo::mark_used(&mut tx, ticket.id).await?;
        repo::delete_unused_siblings(
            &mut tx,
            ticket.account_id,
            PURPOSE_RESET_PASSWORD,
            ticket.id,
        )
        .await?;
        tx.commit().await?;

        Ok(ticket.account_id)
    }
}
