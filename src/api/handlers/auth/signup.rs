//! Signup: start OTP over SMS, optionally over email, then verify.

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, response::Response, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::storage::{self, SignupOutcome, SignupProfile};
use super::types::{AuthResponse, MobileRequest, SignupRequest, VerifyOtpRequest};
use super::utils::{hash_password, normalize_email, normalize_mobile, valid_email, valid_mobile};
use crate::otp::Channel;

/// Start signup: stage an unverified account and send an OTP to the mobile.
#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "OTP sent to the mobile number", body = String),
        (status = 400, description = "Missing or malformed fields", body = String),
        (status = 409, description = "Email or mobile already registered", body = String),
        (status = 502, description = "Verification channel unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn signup(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupRequest>>,
) -> impl IntoResponse {
    let request: SignupRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let first_name = request.first_name.trim();
    let last_name = request.last_name.trim();
    let mobile = normalize_mobile(&request.mobile);
    let email = normalize_email(&request.email);
    if first_name.is_empty()
        || last_name.is_empty()
        || mobile.is_empty()
        || email.is_empty()
        || request.password.is_empty()
    {
        return (
            StatusCode::BAD_REQUEST,
            "All fields are required".to_string(),
        )
            .into_response();
    }
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if !valid_mobile(&mobile) {
        return (StatusCode::BAD_REQUEST, "Invalid mobile number".to_string()).into_response();
    }

    let password_hash = match hash_password(request.password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash signup password: {err}");
            return signup_failed();
        }
    };

    let profile = SignupProfile {
        first_name,
        last_name,
        mobile: &mobile,
        email: &email,
        password_hash: &password_hash,
    };
    match storage::upsert_signup(&pool, &profile).await {
        Ok(SignupOutcome::Started) => {}
        Ok(SignupOutcome::EmailTaken) => {
            return (
                StatusCode::CONFLICT,
                "Email already registered".to_string(),
            )
                .into_response();
        }
        Ok(SignupOutcome::MobileTaken) => {
            return (
                StatusCode::CONFLICT,
                "Mobile already registered".to_string(),
            )
                .into_response();
        }
        Ok(SignupOutcome::Conflict) => {
            return (StatusCode::CONFLICT, "Already registered".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to stage signup account: {err}");
            return signup_failed();
        }
    }

    if let Err(err) = auth_state.otp().start(&mobile, Channel::Sms).await {
        error!("Failed to dispatch signup OTP: {err}");
        return (StatusCode::BAD_GATEWAY, "Failed to send OTP".to_string()).into_response();
    }

    (
        StatusCode::OK,
        "OTP sent to mobile number".to_string(),
    )
        .into_response()
}

/// Re-issue the signup OTP over the account's email channel.
#[utoipa::path(
    post,
    path = "/v1/auth/signup/otp/email",
    request_body = MobileRequest,
    responses(
        (status = 200, description = "OTP sent to the email on file", body = String),
        (status = 400, description = "Missing mobile or no email on file", body = String),
        (status = 404, description = "Unknown account", body = String),
        (status = 502, description = "Verification channel unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn signup_email_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MobileRequest>>,
) -> impl IntoResponse {
    let request: MobileRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let mobile = normalize_mobile(&request.mobile);
    if mobile.is_empty() {
        return (StatusCode::BAD_REQUEST, "mobile is required".to_string()).into_response();
    }

    let account = match storage::lookup_by_mobile(&pool, &mobile).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, "Account not found".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to look up account for email OTP: {err}");
            return signup_failed();
        }
    };

    let Some(email) = account.email else {
        return (StatusCode::BAD_REQUEST, "No email on file".to_string()).into_response();
    };

    if let Err(err) = auth_state.otp().start(&email, Channel::Email).await {
        error!("Failed to dispatch signup email OTP: {err}");
        return (StatusCode::BAD_GATEWAY, "Failed to send OTP".to_string()).into_response();
    }

    (StatusCode::OK, "OTP sent to email".to_string()).into_response()
}

/// Verify the signup OTP over either channel and activate the account.
#[utoipa::path(
    post,
    path = "/v1/auth/signup/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Signup complete", body = AuthResponse),
        (status = 400, description = "Invalid or expired OTP", body = String),
        (status = 404, description = "Unknown account", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_signup(
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
        Ok(Some(account)) => account,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, "Account not found".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to look up account for signup verify: {err}");
            return signup_failed();
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
            error!("Signup OTP check failed: {err}");
            return (
                StatusCode::BAD_GATEWAY,
                "Failed to check OTP".to_string(),
            )
                .into_response();
        }
    }

    if let Err(err) =
        storage::complete_signup_verification(&pool, &account, request.device_id.as_deref()).await
    {
        error!("Failed to complete signup verification: {err}");
        return signup_failed();
    }

    let token = match auth_state
        .tokens()
        .session_token(account.id, account.email.as_deref())
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to sign session token: {err}");
            return signup_failed();
        }
    };

    (
        StatusCode::OK,
        Json(AuthResponse {
            message: "Signup successful".to_string(),
            token,
            account_id: account.id.to_string(),
        }),
    )
        .into_response()
}

fn signup_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Signup failed".to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::test_support::auth_state;
    use super::*;
    use anyhow::Result;
    use axum::http::StatusCode;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn signup_missing_payload() -> Result<()> {
        let response = signup(Extension(lazy_pool()?), Extension(auth_state(vec![])), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn signup_rejects_blank_fields() -> Result<()> {
        let response = signup(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(SignupRequest {
                first_name: " ".to_string(),
                last_name: "Doe".to_string(),
                mobile: "+15550001111".to_string(),
                email: "a@example.com".to_string(),
                password: "hunter2".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn signup_rejects_malformed_email() -> Result<()> {
        let response = signup(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(SignupRequest {
                first_name: "Jo".to_string(),
                last_name: "Doe".to_string(),
                mobile: "+15550001111".to_string(),
                email: "not-an-email".to_string(),
                password: "hunter2".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn signup_rejects_malformed_mobile() -> Result<()> {
        let response = signup(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(SignupRequest {
                first_name: "Jo".to_string(),
                last_name: "Doe".to_string(),
                mobile: "12ab".to_string(),
                email: "a@example.com".to_string(),
                password: "hunter2".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_signup_requires_mobile_and_code() -> Result<()> {
        let response = verify_signup(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(VerifyOtpRequest {
                mobile: "+15550001111".to_string(),
                code: "  ".to_string(),
                device_id: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn signup_email_otp_requires_mobile() -> Result<()> {
        let response = signup_email_otp(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(MobileRequest {
                mobile: String::new(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
