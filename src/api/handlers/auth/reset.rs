//! Password reset: OTP start, ticket issue/rotate, ticket consume.

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, response::Response, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::state::AuthState;
use super::storage::{self, AccountRecord};
use super::types::{
    MobileRequest, ResetPasswordRequest, ResetTicketResponse, VerifyResetOtpRequest,
};
use super::utils::{hash_password, normalize_mobile};
use crate::otp::Channel;
use crate::tickets::TicketError;

/// Start a password reset over SMS.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = MobileRequest,
    responses(
        (status = 200, description = "OTP sent to the mobile number", body = String),
        (status = 400, description = "Missing mobile", body = String),
        (status = 404, description = "Unknown or unverified account", body = String),
        (status = 502, description = "Verification channel unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MobileRequest>>,
) -> impl IntoResponse {
    start_reset(&pool, &auth_state, payload, Channel::Sms).await
}

/// Start a password reset over the email on file.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password/email",
    request_body = MobileRequest,
    responses(
        (status = 200, description = "OTP sent to the email on file", body = String),
        (status = 400, description = "Missing mobile or no email on file", body = String),
        (status = 404, description = "Unknown or unverified account", body = String),
        (status = 502, description = "Verification channel unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn forgot_password_email(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MobileRequest>>,
) -> impl IntoResponse {
    start_reset(&pool, &auth_state, payload, Channel::Email).await
}

async fn start_reset(
    pool: &PgPool,
    auth_state: &AuthState,
    payload: Option<Json<MobileRequest>>,
    channel: Channel,
) -> Response {
    let request: MobileRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let mobile = normalize_mobile(&request.mobile);
    if mobile.is_empty() {
        return (StatusCode::BAD_REQUEST, "mobile is required".to_string()).into_response();
    }

    let account = match verified_account(pool, &mobile).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                "Account not found or not verified".to_string(),
            )
                .into_response();
        }
        Err(response) => return response,
    };

    let destination = match channel {
        Channel::Sms => mobile,
        Channel::Email => match account.email.clone() {
            Some(email) => email,
            None => {
                return (StatusCode::BAD_REQUEST, "No email on file".to_string()).into_response();
            }
        },
    };

    // A fresh reset request abandons whatever episode came before it.
    if let Err(err) = auth_state.tickets().purge(pool, account.id).await {
        error!("Failed to purge reset tickets: {err}");
        return reset_failed();
    }

    if let Err(err) = auth_state.otp().start(&destination, channel).await {
        error!("Failed to dispatch reset OTP: {err}");
        return (StatusCode::BAD_GATEWAY, "Failed to send OTP".to_string()).into_response();
    }

    let message = match channel {
        Channel::Sms => "OTP sent to mobile number",
        Channel::Email => "OTP sent to email",
    };
    (StatusCode::OK, message.to_string()).into_response()
}

/// Verify the reset OTP and hand out a ticket.
///
/// While an unexpired, unused ticket exists, this rotates it instead of
/// re-checking the OTP: the caller gets a fresh rotation window, but the
/// episode's absolute deadline is carried over untouched, so repeated calls
/// can never stretch a reset past the original ceiling.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-reset-otp",
    request_body = VerifyResetOtpRequest,
    responses(
        (status = 200, description = "Reset ticket issued", body = ResetTicketResponse),
        (status = 400, description = "Invalid or expired OTP", body = String),
        (status = 404, description = "Unknown or unverified account", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_reset_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyResetOtpRequest>>,
) -> impl IntoResponse {
    let request: VerifyResetOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let mobile = normalize_mobile(&request.mobile);
    let otp = request.otp.trim();
    if mobile.is_empty() || otp.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "mobile and otp are required".to_string(),
        )
            .into_response();
    }

    let account = match verified_account(&pool, &mobile).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                "Account not found or not verified".to_string(),
            )
                .into_response();
        }
        Err(response) => return response,
    };

    let active = match auth_state.tickets().find_active(&pool, account.id).await {
        Ok(active) => active,
        Err(err) => {
            error!("Failed to look up active reset ticket: {err}");
            return reset_failed();
        }
    };

    if let Some(active) = active {
        match auth_state.tickets().rotate(&pool, account.id, &active).await {
            Ok(ticket) => {
                return (
                    StatusCode::OK,
                    Json(ResetTicketResponse {
                        ticket_id: ticket.ticket_id,
                        expires_in_seconds: ticket.expires_in_seconds,
                    }),
                )
                    .into_response();
            }
            Err(err) => {
                error!("Failed to rotate reset ticket: {err}");
                return reset_failed();
            }
        }
    }

    match auth_state
        .otp()
        .verify(&mobile, account.email.as_deref(), otp)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::BAD_REQUEST,
                "Invalid or expired OTP".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Reset OTP check failed: {err}");
            return (
                StatusCode::BAD_GATEWAY,
                "Failed to check OTP".to_string(),
            )
                .into_response();
        }
    }

    match auth_state.tickets().issue(&pool, account.id).await {
        Ok(ticket) => (
            StatusCode::OK,
            Json(ResetTicketResponse {
                ticket_id: ticket.ticket_id,
                expires_in_seconds: ticket.expires_in_seconds,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to issue reset ticket: {err}");
            reset_failed()
        }
    }
}

/// Consume a reset ticket and set the new password.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset successful", body = String),
        (status = 400, description = "Invalid or expired reset ticket", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let ticket_id = request.ticket_id.trim();
    if ticket_id.is_empty() || request.new_password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "ticket_id and new_password are required".to_string(),
        )
            .into_response();
    }

    let password_hash = match hash_password(request.new_password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash reset password: {err}");
            return reset_failed();
        }
    };

    match auth_state
        .tickets()
        .consume(&pool, ticket_id, &password_hash)
        .await
    {
        Ok(account_id) => {
            debug!(%account_id, "password reset consumed a ticket");
            (
                StatusCode::OK,
                "Password reset successful".to_string(),
            )
                .into_response()
        }
        // The distinct states stay internal; one opaque message avoids a
        // ticket-state oracle.
        Err(TicketError::NotFound | TicketError::AlreadyUsed | TicketError::Expired) => (
            StatusCode::BAD_REQUEST,
            "Invalid or expired reset ticket".to_string(),
        )
            .into_response(),
        Err(TicketError::Store(err)) => {
            error!("Failed to consume reset ticket: {err}");
            reset_failed()
        }
    }
}

async fn verified_account(
    pool: &PgPool,
    mobile: &str,
) -> Result<Option<AccountRecord>, Response> {
    match storage::lookup_by_mobile(pool, mobile).await {
        Ok(Some(account)) if account.is_verified => Ok(Some(account)),
        Ok(_) => Ok(None),
        Err(err) => {
            error!("Failed to look up account for reset: {err}");
            Err(reset_failed())
        }
    }
}

fn reset_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Password reset failed".to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::test_support::auth_state;
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn forgot_password_missing_payload() -> Result<()> {
        let response = forgot_password(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_reset_otp_requires_both_fields() -> Result<()> {
        let response = verify_reset_otp(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(VerifyResetOtpRequest {
                mobile: "+15550001111".to_string(),
                otp: String::new(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_requires_ticket_and_password() -> Result<()> {
        let response = reset_password(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(ResetPasswordRequest {
                ticket_id: "  ".to_string(),
                new_password: "hunter2".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
