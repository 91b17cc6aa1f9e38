use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{
    auth_flow::Unverified,
    error::ApiError,
    otp::OtpTable,
    routes::{Envelope, JsonBody},
    state::AppState,
};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRegistrationRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedEmail {
    pub email: String,
}

#[tracing::instrument(name = "POST /auth/unverified_register", skip(state, body))]
pub async fn unverified_register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    Unverified::new(&body.email)?
        .require_new_account(state.accounts.as_ref())
        .await?
        .issue_otp(state.mail_client.as_ref())
        .await?
        .stage_registration(state.accounts.as_ref(), &body.password)
        .await?;

    Ok(Envelope::message(
        "Nonverified registration process completed successfully",
    ))
}

#[tracing::instrument(name = "POST /auth/verify_registration", skip(state, body))]
pub async fn verify_registration(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<VerifyRegistrationRequest>,
) -> Result<Json<Envelope<VerifiedEmail>>, ApiError> {
    let email = Unverified::new(&body.email)?
        .verify_otp(
            state.accounts.as_ref(),
            OtpTable::PendingRegistration,
            &body.otp_code,
            state.otp_policy,
        )
        .await?
        .commit_registration(state.accounts.as_ref())
        .await?;

    Ok(Envelope::with_data(
        "User verified successfully",
        VerifiedEmail { email },
    ))
}

#[tracing::instrument(name = "POST /auth/resend_otp_registration", skip(state, body))]
pub async fn resend_otp_registration(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    Unverified::new(&body.email)?
        .issue_otp(state.mail_client.as_ref())
        .await?
        .store(state.accounts.as_ref(), OtpTable::PendingRegistration)
        .await?;

    Ok(Envelope::message("OTP has been sent."))
}
