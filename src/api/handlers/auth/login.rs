//! Login: password-based and OTP-based.

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, response::Response, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::storage::{self, AccountRecord};
use super::types::{AuthResponse, MobileRequest, PasswordLoginRequest, VerifyOtpRequest};
use super::utils::{normalize_mobile, verify_password};
use crate::otp::Channel;

/// Password login against the mobile handle.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = PasswordLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing fields", body = String),
        (status = 401, description = "Bad credentials or unverified account", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordLoginRequest>>,
) -> impl IntoResponse {
    let request: PasswordLoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let mobile = normalize_mobile(&request.mobile);
    if mobile.is_empty() || request.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "mobile and password are required".to_string(),
        )
            .into_response();
    }

    // One low-detail 401 for every credential failure; anything finer is an
    // account-probing oracle.
    let account = match storage::lookup_by_mobile(&pool, &mobile).await {
        Ok(Some(account)) if account.is_verified => account,
        Ok(_) => return unauthorized(),
        Err(err) => {
            error!("Failed to look up account for login: {err}");
            return login_failed();
        }
    };

    let Some(password_hash) = account.password_hash.clone() else {
        // Federated-only account; it has no password to check.
        return unauthorized();
    };
    match verify_password(request.password, password_hash).await {
        Ok(true) => {}
        Ok(false) => return unauthorized(),
        Err(err) => {
            error!("Password check failed: {err}");
            return login_failed();
        }
    }

    finish_login(&pool, &auth_state, &account, request.device_id.as_deref()).await
}

/// Start an OTP login over SMS.
#[utoipa::path(
    post,
    path = "/v1/auth/login-otp",
    request_body = MobileRequest,
    responses(
        (status = 200, description = "OTP sent to the mobile number", body = String),
        (status = 400, description = "Missing mobile", body = String),
        (status = 404, description = "Unknown or unverified account", body = String),
        (status = 502, description = "Verification channel unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn login_otp_start(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MobileRequest>>,
) -> impl IntoResponse {
    let Some(account) = (match verified_account(&pool, payload).await {
        Ok(found) => found,
        Err(response) => return response,
    }) else {
        return account_not_found();
    };

    if let Err(err) = auth_state.otp().start(&account.mobile, Channel::Sms).await {
        error!("Failed to dispatch login OTP: {err}");
        return (StatusCode::BAD_GATEWAY, "Failed to send OTP".to_string()).into_response();
    }
    (
        StatusCode::OK,
        "OTP sent to mobile number".to_string(),
    )
        .into_response()
}

/// Start an OTP login over the email on file.
#[utoipa::path(
    post,
    path = "/v1/auth/login-otp/email",
    request_body = MobileRequest,
    responses(
        (status = 200, description = "OTP sent to the email on file", body = String),
        (status = 400, description = "Missing mobile or no email on file", body = String),
        (status = 404, description = "Unknown or unverified account", body = String),
        (status = 502, description = "Verification channel unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn login_otp_start_email(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MobileRequest>>,
) -> impl IntoResponse {
    let Some(account) = (match verified_account(&pool, payload).await {
        Ok(found) => found,
        Err(response) => return response,
    }) else {
        return account_not_found();
    };

    let Some(email) = account.record.email.clone() else {
        return (StatusCode::BAD_REQUEST, "No email on file".to_string()).into_response();
    };
    if let Err(err) = auth_state.otp().start(&email, Channel::Email).await {
        error!("Failed to dispatch login email OTP: {err}");
        return (StatusCode::BAD_GATEWAY, "Failed to send OTP".to_string()).into_response();
    }
    (StatusCode::OK, "OTP sent to email".to_string()).into_response()
}

/// Verify a login OTP over either channel and mint a session token.
#[utoipa::path(
    post,
    path = "/v1/auth/login-otp/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid or expired OTP", body = String),
        (status = 404, description = "Unknown or unverified account", body = String)
    ),
    tag = "auth"
)]
pub async fn login_otp_verify(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let request: VerifyOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let mobile = normalize_mobile(&request.mobile);
    let code = request.code.trim();
    if mobile.is_empty() || code.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "mobile and code are required".to_string(),
        )
            .into_response();
    }

    let account = match storage::lookup_by_mobile(&pool, &mobile).await {
        Ok(Some(account)) if account.is_verified => account,
        Ok(_) => return account_not_found(),
        Err(err) => {
            error!("Failed to look up account for OTP login: {err}");
            return login_failed();
        }
    };

    match auth_state
        .otp()
        .verify(&mobile, account.email.as_deref(), code)
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
            error!("Login OTP check failed: {err}");
            return (
                StatusCode::BAD_GATEWAY,
                "Failed to check OTP".to_string(),
            )
                .into_response();
        }
    }

    finish_login(&pool, &auth_state, &account, request.device_id.as_deref()).await
}

struct VerifiedLookup {
    record: AccountRecord,
    mobile: String,
}

/// Shared prologue for the OTP-start handlers: payload, mobile, verified
/// account. `Ok(None)` means the account is unknown or unverified.
async fn verified_account(
    pool: &PgPool,
    payload: Option<Json<MobileRequest>>,
) -> Result<Option<VerifiedLookup>, Response> {
    let request: MobileRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return Err(
                (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response()
            );
        }
    };
    let mobile = normalize_mobile(&request.mobile);
    if mobile.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "mobile is required".to_string()).into_response());
    }
    match storage::lookup_by_mobile(pool, &mobile).await {
        Ok(Some(record)) if record.is_verified => Ok(Some(VerifiedLookup { record, mobile })),
        Ok(_) => Ok(None),
        Err(err) => {
            error!("Failed to look up account: {err}");
            Err(login_failed())
        }
    }
}

async fn finish_login(
    pool: &PgPool,
    auth_state: &AuthState,
    account: &AccountRecord,
    device_id: Option<&str>,
) -> Response {
    if let Err(err) = storage::record_device_login(pool, account.id, device_id).await {
        error!("Failed to record device login: {err}");
        return login_failed();
    }

    match auth_state
        .tokens()
        .session_token(account.id, account.email.as_deref())
    {
        Ok(token) => (
            StatusCode::OK,
            Json(AuthResponse {
                message: "Login successful".to_string(),
                token,
                account_id: account.id.to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to sign session token: {err}");
            login_failed()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        "Invalid credentials".to_string(),
    )
        .into_response()
}

fn account_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        "Account not found or not verified".to_string(),
    )
        .into_response()
}

fn login_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Login failed".to_string(),
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
    async fn login_missing_payload() -> Result<()> {
        let response = login(Extension(lazy_pool()?), Extension(auth_state(vec![])), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_requires_mobile_and_password() -> Result<()> {
        let response = login(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(PasswordLoginRequest {
                mobile: "+15550001111".to_string(),
                password: String::new(),
                device_id: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_otp_start_missing_payload() -> Result<()> {
        let response = login_otp_start(
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
    async fn login_otp_verify_requires_code() -> Result<()> {
        let response = login_otp_verify(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(VerifyOtpRequest {
                mobile: "+15550001111".to_string(),
                code: String::new(),
                device_id: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
