//! Federated sign-in endpoints (Google and Apple).

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, response::Response, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::state::AuthState;
use super::storage;
use super::types::{AppleSignInRequest, AuthResponse, GoogleSignInRequest};
use crate::federated::ProviderError;

/// Sign in with a Google-issued id token.
#[utoipa::path(
    post,
    path = "/v1/auth/google",
    request_body = GoogleSignInRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing id token", body = String),
        (status = 401, description = "Invalid Google token", body = String)
    ),
    tag = "auth"
)]
pub async fn google(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<GoogleSignInRequest>>,
) -> impl IntoResponse {
    let request: GoogleSignInRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    if request.id_token.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing id_token".to_string()).into_response();
    }

    let identity = match auth_state.google().verify(request.id_token.trim()).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!("Rejected Google token: {err}");
            return (
                StatusCode::UNAUTHORIZED,
                "Invalid Google token".to_string(),
            )
                .into_response();
        }
    };

    sign_in(&pool, &auth_state, &identity, request.device_id.as_deref()).await
}

/// Sign in with an Apple identity token bound to a client nonce.
#[utoipa::path(
    post,
    path = "/v1/auth/apple",
    request_body = AppleSignInRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing identity token or nonce", body = String),
        (status = 401, description = "Invalid Apple token or nonce mismatch", body = String)
    ),
    tag = "auth"
)]
pub async fn apple(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<AppleSignInRequest>>,
) -> impl IntoResponse {
    let request: AppleSignInRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    let identity_token = request.identity_token.trim();
    let raw_nonce = request.raw_nonce.trim();
    if identity_token.is_empty() || raw_nonce.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Missing identity_token or raw_nonce".to_string(),
        )
            .into_response();
    }

    let identity = match auth_state.apple().verify(identity_token, raw_nonce).await {
        Ok(identity) => identity,
        Err(ProviderError::NonceMismatch) => {
            warn!("Rejected Apple token: nonce mismatch");
            return (StatusCode::UNAUTHORIZED, "Nonce mismatch".to_string()).into_response();
        }
        Err(err) => {
            warn!("Rejected Apple token: {err}");
            return (
                StatusCode::UNAUTHORIZED,
                "Invalid Apple token".to_string(),
            )
                .into_response();
        }
    };

    sign_in(&pool, &auth_state, &identity, request.device_id.as_deref()).await
}

async fn sign_in(
    pool: &PgPool,
    auth_state: &AuthState,
    identity: &crate::federated::VerifiedIdentity,
    device_id: Option<&str>,
) -> Response {
    let account_id: Uuid = match storage::resolve_federated(pool, identity, device_id).await {
        Ok(account_id) => account_id,
        Err(err) => {
            error!("Failed to resolve federated account: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    match auth_state.tokens().federated_token(account_id) {
        Ok(token) => (
            StatusCode::OK,
            Json(AuthResponse {
                message: "Login successful".to_string(),
                token,
                account_id: account_id.to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to sign federated token: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response()
        }
    }
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
    async fn google_missing_payload() -> Result<()> {
        let response = google(Extension(lazy_pool()?), Extension(auth_state(vec![])), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn google_requires_id_token() -> Result<()> {
        let response = google(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(GoogleSignInRequest {
                id_token: "  ".to_string(),
                device_id: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn google_rejects_garbage_token() -> Result<()> {
        // A malformed JWT fails in the header parse, before any key fetch.
        let response = google(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(GoogleSignInRequest {
                id_token: "not-a-jwt".to_string(),
                device_id: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn apple_requires_token_and_nonce() -> Result<()> {
        let response = apple(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(AppleSignInRequest {
                identity_token: "token".to_string(),
                raw_nonce: String::new(),
                device_id: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn apple_rejects_garbage_token() -> Result<()> {
        let response = apple(
            Extension(lazy_pool()?),
            Extension(auth_state(vec![])),
            Some(Json(AppleSignInRequest {
                identity_token: "not-a-jwt".to_string(),
                raw_nonce: "nonce".to_string(),
                device_id: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
