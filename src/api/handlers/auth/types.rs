//! Request/response types for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub mobile: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MobileRequest {
    pub mobile: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub mobile: String,
    pub code: String,
    pub device_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordLoginRequest {
    pub mobile: String,
    pub password: String,
    pub device_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResetOtpRequest {
    pub mobile: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub ticket_id: String,
    pub new_password: String,
}

/// Mode selector for the availability probes.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CheckMode {
    Signup,
    ForgotPassword,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckEmailRequest {
    pub email: String,
    #[serde(rename = "type")]
    pub mode: CheckMode,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckMobileRequest {
    pub mobile: String,
    #[serde(rename = "type")]
    pub mode: CheckMode,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GoogleSignInRequest {
    pub id_token: String,
    pub device_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AppleSignInRequest {
    pub identity_token: String,
    pub raw_nonce: String,
    pub device_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub account_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetTicketResponse {
    pub ticket_id: String,
    pub expires_in_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn check_mode_uses_kebab_case_on_the_wire() -> Result<()> {
        let request: CheckEmailRequest =
            serde_json::from_str(r#"{"email":"a@example.com","type":"forgot-password"}"#)?;
        assert_eq!(request.mode, CheckMode::ForgotPassword);

        let request: CheckMobileRequest =
            serde_json::from_str(r#"{"mobile":"+15550001111","type":"signup"}"#)?;
        assert_eq!(request.mode, CheckMode::Signup);
        Ok(())
    }

    #[test]
    fn verify_otp_request_device_is_optional() -> Result<()> {
        let request: VerifyOtpRequest =
            serde_json::from_str(r#"{"mobile":"+15550001111","code":"483920"}"#)?;
        assert_eq!(request.device_id, None);
        Ok(())
    }

    #[test]
    fn auth_response_round_trips() -> Result<()> {
        let response = AuthResponse {
            message: "Login successful".to_string(),
            token: "jwt".to_string(),
            account_id: "id".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        let decoded: AuthResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.account_id, "id");
        Ok(())
    }
}
