//! Database access for reset tickets.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::models::ActiveTicket;

pub(super) async fn find_active(
    pool: &PgPool,
    account_id: Uuid,
    purpose: &str,
    now: DateTime<Utc>,
) -> Result<Option<ActiveTicket>> {
    let query = r"
        SELECT absolute_expires_at
        FROM reset_tickets
        WHERE account_id = $1
          AND purpose = $2
          AND used = FALSE
          AND expires_at > $3
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .bind(purpose)
        .bind(now)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up active reset ticket")?;

    Ok(row.map(|row| ActiveTicket {
        absolute_expires_at: row.get("absolute_expires_at"),
    }))
}

pub(super) async fn delete_for_account(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    purpose: &str,
) -> Result<()> {
    let query = "DELETE FROM reset_tickets WHERE account_id = $1 AND purpose = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(purpose)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete reset tickets")?;
    Ok(())
}

/// Purge every ticket for the account outside a larger transaction.
///
/// Used by the forgot-password start handlers as defensive cleanup.
pub(super) async fn purge_for_account(
    pool: &PgPool,
    account_id: Uuid,
    purpose: &str,
) -> Result<()> {
    let query = "DELETE FROM reset_tickets WHERE account_id = $1 AND purpose = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(purpose)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to purge reset tickets")?;
    Ok(())
}

pub(super) async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    ticket_hash: &[u8],
    account_id: Uuid,
    purpose: &str,
    expires_at: DateTime<Utc>,
    absolute_expires_at: DateTime<Utc>,
) -> Result<()> {
    let query = r"
        INSERT INTO reset_tickets
            (ticket_hash, account_id, purpose, expires_at, absolute_expires_at)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(ticket_hash)
        .bind(account_id)
        .bind(purpose)
        .bind(expires_at)
        .bind(absolute_expires_at)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert reset ticket")?;
    Ok(())
}

pub(super) struct TicketRow {
    pub(super) id: Uuid,
    pub(super) account_id: Uuid,
    pub(super) used: bool,
    pub(super) expires_at: DateTime<Utc>,
}

/// Lock a ticket row by hash so consume and rotate serialize per ticket.
pub(super) async fn lock_by_hash(
    tx: &mut Transaction<'_, Postgres>,
    ticket_hash: &[u8],
) -> Result<Option<TicketRow>, sqlx::Error> {
    let query = r"
        SELECT id, account_id, used, expires_at
        FROM reset_tickets
        WHERE ticket_hash = $1
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(ticket_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await?;

    Ok(row.map(|row| TicketRow {
        id: row.get("id"),
        account_id: row.get("account_id"),
        used: row.get("used"),
        expires_at: row.get("expires_at"),
    }))
}

pub(super) async fn mark_used(
    tx: &mut Transaction<'_, Postgres>,
    ticket_id: Uuid,
) -> Result<(), sqlx::Error> {
    let query = "UPDATE reset_tickets SET used = TRUE WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(ticket_id)
        .execute(&mut **tx)
        .instrument(span)
        .await?;
    Ok(())
}

/// Remove unused siblings so a pre-rotation ticket cannot be replayed.
pub(super) async fn delete_unused_siblings(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    purpose: &str,
    keep: Uuid,
) -> Result<(), sqlx::Error> {
    let query = r"
        DELETE FROM reset_tickets
        WHERE account_id = $1
          AND purpose = $2
          AND used = FALSE
          AND id <> $3
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(purpose)
        .bind(keep)
        .execute(&mut **tx)
        .instrument(span)
        .await?;
    Ok(())
}

pub(super) async fn update_password(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    let query = r"
        UPDATE accounts
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await?;
    Ok(())
}
