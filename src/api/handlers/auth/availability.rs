//! Availability probes the signup and forgot-password screens call before
//! dispatching an OTP.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use tracing::error;

use super::storage;
use super::types::{CheckEmailRequest, CheckMobileRequest, CheckMode};
use super::utils::{normalize_email, normalize_mobile, valid_email};

#[utoipa::path(
    post,
    path = "/v1/auth/check-email",
    request_body = CheckEmailRequest,
    responses(
        (status = 200, description = "Email usable for the requested flow", body = String),
        (status = 400, description = "Missing fields or email not registered", body = String),
        (status = 409, description = "Email already registered", body = String)
    ),
    tag = "auth"
)]
pub async fn check_email(
    pool: Extension<PgPool>,
    payload: Option<Json<CheckEmailRequest>>,
) -> impl IntoResponse {
    let request: CheckEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if email.is_empty() || !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let verified = match storage::lookup_by_email(&pool, &email).await {
        Ok(account) => account.is_some_and(|account| account.is_verified),
        Err(err) => {
            error!("Failed to check email availability: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Check failed".to_string(),
            )
                .into_response();
        }
    };

    respond(request.mode, verified, "Email")
}

#[utoipa::path(
    post,
    path = "/v1/auth/check-mobile",
    request_body = CheckMobileRequest,
    responses(
        (status = 200, description = "Mobile usable for the requested flow", body = String),
        (status = 400, description = "Missing fields or mobile not registered", body = String),
        (status = 409, description = "Mobile already registered", body = String)
    ),
    tag = "auth"
)]
pub async fn check_mobile(
    pool: Extension<PgPool>,
    payload: Option<Json<CheckMobileRequest>>,
) -> impl IntoResponse {
    let request: CheckMobileRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let mobile = normalize_mobile(&request.mobile);
    if mobile.is_empty() {
        return (StatusCode::BAD_REQUEST, "mobile is required".to_string()).into_response();
    }

    let verified = match storage::lookup_by_mobile(&pool, &mobile).await {
        Ok(account) => account.is_some_and(|account| account.is_verified),
        Err(err) => {
            error!("Failed to check mobile availability: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Check failed".to_string(),
            )
                .into_response();
        }
    };

    respond(request.mode, verified, "Mobile")
}

fn respond(mode: CheckMode, verified: bool, handle: &str) -> axum::response::Response {
    match mode {
        CheckMode::Signup => {
            if verified {
                (
                    StatusCode::CONFLICT,
                    format!("{handle} already registered"),
                )
                    .into_response()
            } else {
                (StatusCode::OK, format!("{handle} available for signup")).into_response()
            }
        }
        CheckMode::ForgotPassword => {
            if verified {
                (
                    StatusCode::OK,
                    format!("{handle} valid for password reset"),
                )
                    .into_response()
            } else {
                (StatusCode::BAD_REQUEST, format!("{handle} not registered")).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[test]
    fn respond_maps_modes_to_statuses() {
        assert_eq!(
            respond(CheckMode::Signup, true, "Email").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            respond(CheckMode::Signup, false, "Email").status(),
            StatusCode::OK
        );
        assert_eq!(
            respond(CheckMode::ForgotPassword, true, "Mobile").status(),
            StatusCode::OK
        );
        assert_eq!(
            respond(CheckMode::ForgotPassword, false, "Mobile").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn check_email_rejects_invalid_email() -> Result<()> {
        let response = check_email(
            Extension(lazy_pool()?),
            Some(Json(CheckEmailRequest {
                email: "nope".to_string(),
                mode: CheckMode::Signup,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn check_mobile_missing_payload() -> Result<()> {
        let response = check_mobile(Extension(lazy_pool()?), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
