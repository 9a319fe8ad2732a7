use super::handlers::{auth, health};
use utoipa::openapi::{InfoBuilder, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Generate the OpenAPI document without serving anything.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the OpenAPI document.
///
/// New endpoints belong here via `.routes(routes!(...))` so they are both
/// served and documented.
pub(crate) fn api_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::signup::signup))
        .routes(routes!(auth::signup::signup_email_otp))
        .routes(routes!(auth::signup::verify_signup))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::login::login_otp_start))
        .routes(routes!(auth::login::login_otp_start_email))
        .routes(routes!(auth::login::login_otp_verify))
        .routes(routes!(auth::reset::forgot_password))
        .routes(routes!(auth::reset::forgot_password_email))
        .routes(routes!(auth::reset::verify_reset_otp))
        .routes(routes!(auth::reset::reset_password))
        .routes(routes!(auth::availability::check_email))
        .routes(routes!(auth::availability::check_mobile))
        .routes(routes!(auth::federated::google))
        .routes(routes!(auth::federated::apple))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    let mut encore_tag = Tag::new("encore");
    encore_tag.description = Some("Service metadata".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Signup, login, password reset, federated sign-in".to_string());

    OpenApiBuilder::new()
        .info(info)
        .tags(Some(vec![encore_tag, auth_tag]))
        .build()
}
