use axum::{Json, extract::State};
use serde::Deserialize;

use crate::{
    auth_flow::Unverified,
    error::ApiError,
    otp::{OtpReplayPolicy, OtpTable},
    routes::{Envelope, JsonBody},
    state::AppState,
};

use super::registration::{EmailRequest, VerifyRegistrationRequest};

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp_code: String,
    #[serde(default)]
    pub password: String,
}

#[tracing::instrument(name = "POST /auth/can_reset_password", skip(state, body))]
pub async fn can_reset_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    Unverified::new(&body.email)?
        .require_existing_account(state.accounts.as_ref())
        .await?
        .issue_otp(state.mail_client.as_ref())
        .await?
        .store(state.accounts.as_ref(), OtpTable::Account)
        .await?;

    Ok(Envelope::message("OTP has been sent."))
}

#[tracing::instrument(name = "POST /auth/resend_otp_reset_password", skip(state, body))]
pub async fn resend_otp_reset_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    Unverified::new(&body.email)?
        .issue_otp(state.mail_client.as_ref())
        .await?
        .store(state.accounts.as_ref(), OtpTable::Account)
        .await?;

    Ok(Envelope::message("OTP has been sent."))
}

#[tracing::instrument(name = "POST /auth/reset_password", skip(state, body))]
pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ResetPasswordRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    Unverified::new(&body.email)?
        .verify_otp(
            state.accounts.as_ref(),
            OtpTable::Account,
            &body.otp_code,
            state.otp_policy,
        )
        .await?
        .reset_password(state.accounts.as_ref(), &body.password)
        .await?;

    Ok(Envelope::message("Password resets successfully."))
}

/// Checks a reset code without consuming it. The code is consumed by
/// `reset_password` when replay is disabled.
#[tracing::instrument(name = "POST /auth/verify_otp", skip(state, body))]
pub async fn verify_otp(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<VerifyRegistrationRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    Unverified::new(&body.email)?
        .verify_otp(
            state.accounts.as_ref(),
            OtpTable::Account,
            &body.otp_code,
            OtpReplayPolicy::AllowReplay,
        )
        .await?;

    Ok(Envelope::message("OTP verified successfully"))
}
