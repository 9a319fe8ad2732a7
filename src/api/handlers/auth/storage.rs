//! Database helpers for accounts, devices, and federated identities.

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;
use crate::federated::VerifiedIdentity;

/// Account fields the auth flows operate on. The password hash never leaves
/// this module except for comparison.
pub(super) struct AccountRecord {
    pub(super) id: Uuid,
    pub(super) email: Option<String>,
    pub(super) first_name: String,
    pub(super) last_name: String,
    pub(super) password_hash: Option<String>,
    pub(super) is_verified: bool,
}

/// Outcome of a signup attempt.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Started,
    EmailTaken,
    MobileTaken,
    Conflict,
}

pub(super) struct SignupProfile<'a> {
    pub(super) first_name: &'a str,
    pub(super) last_name: &'a str,
    pub(super) mobile: &'a str,
    pub(super) email: &'a str,
    pub(super) password_hash: &'a str,
}

/// Retry a single idempotent read once when the store hiccups.
async fn retry_transient<T, F, Fut>(op: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    match op().await {
        Err(err) if is_transient(&err) => op().await,
        result => result,
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> AccountRecord {
    AccountRecord {
        id: row.get("id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        is_verified: row.get("is_verified"),
    }
}

const ACCOUNT_COLUMNS: &str = "id, email, first_name, last_name, password_hash, is_verified";

pub(super) async fn lookup_by_mobile(
    pool: &PgPool,
    mobile: &str,
) -> Result<Option<AccountRecord>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE mobile = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let sql = query.as_str();
    let row = retry_transient(|| async move {
        sqlx::query(sql).bind(mobile).fetch_optional(pool).await
    })
    .instrument(span)
    .await
    .context("failed to look up account by mobile")?;
    Ok(row.as_ref().map(account_from_row))
}

pub(super) async fn lookup_by_email(pool: &PgPool, email: &str) -> Result<Option<AccountRecord>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let sql = query.as_str();
    let row = retry_transient(|| async move {
        sqlx::query(sql).bind(email).fetch_optional(pool).await
    })
    .instrument(span)
    .await
    .context("failed to look up account by email")?;
    Ok(row.as_ref().map(account_from_row))
}

/// Create or refresh the unverified account a signup attempt targets.
///
/// A verified account on either handle wins the conflict; an unverified one
/// is reclaimed and overwritten, so an abandoned signup never squats a
/// mobile number or email.
pub(super) async fn upsert_signup(
    pool: &PgPool,
    profile: &SignupProfile<'_>,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let by_email = select_for_signup(&mut tx, "email", profile.email).await?;
    if by_email.as_ref().is_some_and(|account| account.is_verified) {
        let _ = tx.rollback().await;
        return Ok(SignupOutcome::EmailTaken);
    }
    let by_mobile = select_for_signup(&mut tx, "mobile", profile.mobile).await?;
    if by_mobile.as_ref().is_some_and(|account| account.is_verified) {
        let _ = tx.rollback().await;
        return Ok(SignupOutcome::MobileTaken);
    }

    let existing = by_email.or(by_mobile);
    let result = match existing {
        Some(account) => {
            let query = r"
                UPDATE accounts
                SET first_name = $2,
                    last_name = $3,
                    mobile = $4,
                    email = $5,
                    password_hash = $6,
                    is_verified = FALSE,
                    updated_at = NOW()
                WHERE id = $1
            ";
            sqlx::query(query)
                .bind(account.id)
                .bind(profile.first_name)
                .bind(profile.last_name)
                .bind(profile.mobile)
                .bind(profile.email)
                .bind(profile.password_hash)
                .execute(&mut *tx)
                .await
        }
        None => {
            let query = r"
                INSERT INTO accounts
                    (first_name, last_name, mobile, email, password_hash, is_verified)
                VALUES ($1, $2, $3, $4, $5, FALSE)
            ";
            sqlx::query(query)
                .bind(profile.first_name)
                .bind(profile.last_name)
                .bind(profile.mobile)
                .bind(profile.email)
                .bind(profile.password_hash)
                .execute(&mut *tx)
                .await
        }
    };

    match result {
        Ok(_) => {
            tx.commit().await.context("commit signup transaction")?;
            Ok(SignupOutcome::Started)
        }
        Err(err) if is_unique_violation(&err) => {
            // A concurrent signup claimed one of the handles first.
            let _ = tx.rollback().await;
            Ok(SignupOutcome::Conflict)
        }
        Err(err) => Err(err).context("failed to write signup account"),
    }
}

async fn select_for_signup(
    tx: &mut Transaction<'_, Postgres>,
    column: &str,
    value: &str,
) -> Result<Option<AccountRecord>> {
    // FOR UPDATE so two racing signups for the same handle serialize here.
    let query =
        format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = $1 FOR UPDATE");
    let row = sqlx::query(&query)
        .bind(value)
        .fetch_optional(&mut **tx)
        .await
        .with_context(|| format!("failed to look up signup account by {column}"))?;
    Ok(row.as_ref().map(account_from_row))
}

/// Flip the account to verified, stamp the device, and queue the welcome
/// email, all in one transaction so the email only exists for committed
/// verifications.
pub(super) async fn complete_signup_verification(
    pool: &PgPool,
    account: &AccountRecord,
    device_id: Option<&str>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin verification transaction")?;

    let query = r"
        UPDATE accounts
        SET is_verified = TRUE,
            updated_at = NOW()
        WHERE id = $1
    ";
    sqlx::query(query)
        .bind(account.id)
        .execute(&mut *tx)
        .await
        .context("failed to mark account verified")?;

    if let Some(device_id) = device_id {
        upsert_device(&mut tx, account.id, device_id).await?;
    }

    if let Some(email) = account.email.as_deref() {
        enqueue_welcome_email(&mut tx, email, &account.first_name, &account.last_name).await?;
    }

    tx.commit().await.context("commit verification transaction")
}

/// Upsert the device row for a successful authentication.
///
/// `ON CONFLICT` keeps concurrent logins from losing each other's updates;
/// an existing push token survives the refresh.
async fn upsert_device(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    device_id: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO account_devices (account_id, device_id, last_login_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (account_id, device_id)
        DO UPDATE SET last_login_at = NOW()
    ";
    sqlx::query(query)
        .bind(account_id)
        .bind(device_id)
        .execute(&mut **tx)
        .await
        .context("failed to upsert device")?;
    Ok(())
}

/// Stamp the device list after a password or OTP login.
pub(super) async fn record_device_login(
    pool: &PgPool,
    account_id: Uuid,
    device_id: Option<&str>,
) -> Result<()> {
    let Some(device_id) = device_id else {
        return Ok(());
    };
    let mut tx = pool.begin().await.context("begin device transaction")?;
    upsert_device(&mut tx, account_id, device_id).await?;
    tx.commit().await.context("commit device transaction")
}

async fn enqueue_welcome_email(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    first_name: &str,
    last_name: &str,
) -> Result<()> {
    let payload = serde_json::to_string(&json!({
        "email": email,
        "first_name": first_name,
        "last_name": last_name,
    }))
    .context("failed to serialize welcome payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, 'welcome', $2::jsonb)
    ";
    sqlx::query(query)
        .bind(email)
        .bind(payload)
        .execute(&mut **tx)
        .await
        .context("failed to enqueue welcome email")?;
    Ok(())
}

/// Resolve a verified federated identity to a local account.
///
/// Order: exact `(provider, provider_user_id)` match, else a
/// provider-verified email match (linking the identity idempotently), else a
/// new verified, password-less account. Runs at most twice: a concurrent
/// sign-in for the same identity loses the insert race and finds the winner
/// on the retry.
pub(super) async fn resolve_federated(
    pool: &PgPool,
    identity: &VerifiedIdentity,
    device_id: Option<&str>,
) -> Result<Uuid> {
    for _ in 0..2 {
        match try_resolve_federated(pool, identity, device_id).await {
            Ok(account_id) => return Ok(account_id),
            Err(ResolveError::Conflict) => continue,
            Err(ResolveError::Other(err)) => return Err(err),
        }
    }
    Err(anyhow!("federated sign-in kept losing the identity race"))
}

enum ResolveError {
    Conflict,
    Other(anyhow::Error),
}

impl From<sqlx::Error> for ResolveError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            Self::Conflict
        } else {
            Self::Other(err.into())
        }
    }
}

async fn try_resolve_federated(
    pool: &PgPool,
    identity: &VerifiedIdentity,
    device_id: Option<&str>,
) -> Result<Uuid, ResolveError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| ResolveError::Other(err.into()))?;

    let provider = identity.provider.as_str();

    let query = r"
        SELECT account_id
        FROM linked_identities
        WHERE provider = $1 AND provider_user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let linked = sqlx::query(query)
        .bind(provider)
        .bind(&identity.provider_user_id)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await?;

    let account_id: Uuid = if let Some(row) = linked {
        row.get("account_id")
    } else if let Some(email) = identity.verified_email.as_deref() {
        let row = sqlx::query("SELECT id FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;
        match row {
            Some(row) => {
                let account_id = row.get("id");
                link_identity(&mut tx, account_id, identity).await?;
                account_id
            }
            None => create_federated_account(&mut tx, identity).await?,
        }
    } else {
        // No verified email: create an email-less account rather than risk
        // linking through an address the provider never vouched for.
        create_federated_account(&mut tx, identity).await?
    };

    let query = r"
        UPDATE accounts
        SET last_login_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
    ";
    sqlx::query(query)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    if let Some(device_id) = device_id {
        upsert_device(&mut tx, account_id, device_id)
            .await
            .map_err(ResolveError::Other)?;
    }

    tx.commit()
        .await
        .map_err(|err| ResolveError::Other(err.into()))?;
    Ok(account_id)
}

async fn link_identity(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    identity: &VerifiedIdentity,
) -> Result<(), sqlx::Error> {
    // DO NOTHING makes re-linking the same pair a no-op.
    let query = r"
        INSERT INTO linked_identities
            (account_id, provider, provider_user_id, email_at_link)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (provider, provider_user_id) DO NOTHING
    ";
    sqlx::query(query)
        .bind(account_id)
        .bind(identity.provider.as_str())
        .bind(&identity.provider_user_id)
        .bind(identity.verified_email.as_deref())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn create_federated_account(
    tx: &mut Transaction<'_, Postgres>,
    identity: &VerifiedIdentity,
) -> Result<Uuid, sqlx::Error> {
    let query = r"
        INSERT INTO accounts (email, first_name, last_name, is_verified)
        VALUES ($1, $2, $3, TRUE)
        RETURNING id
    ";
    let row = sqlx::query(query)
        .bind(identity.verified_email.as_deref())
        .bind(identity.given_name.as_deref().unwrap_or(""))
        .bind(identity.family_name.as_deref().unwrap_or(""))
        .fetch_one(&mut **tx)
        .await?;
    let account_id: Uuid = row.get("id");

    let query = r"
        INSERT INTO linked_identities
            (account_id, provider, provider_user_id, email_at_link)
        VALUES ($1, $2, $3, $4)
    ";
    sqlx::query(query)
        .bind(account_id)
        .bind(identity.provider.as_str())
        .bind(&identity.provider_user_id)
        .bind(identity.verified_email.as_deref())
        .execute(&mut **tx)
        .await?;

    Ok(account_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(format!("{:?}", SignupOutcome::Started), "Started");
        assert_eq!(format!("{:?}", SignupOutcome::EmailTaken), "EmailTaken");
        assert_eq!(format!("{:?}", SignupOutcome::MobileTaken), "MobileTaken");
        assert_eq!(format!("{:?}", SignupOutcome::Conflict), "Conflict");
    }

    #[test]
    fn transient_errors_are_narrow() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn retry_transient_retries_exactly_once() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result: Result<u32, sqlx::Error> = retry_transient(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.expect("second attempt succeeds"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_transient_passes_through_hard_errors() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result: Result<u32, sqlx::Error> = retry_transient(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
