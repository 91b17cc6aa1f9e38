use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    otp,
    routes::{Envelope, JsonBody},
    state::AppState,
    store::{Credentials, StoreError, StoreResult},
};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

async fn check_password(found: StoreResult<Credentials>, presented: &str) -> Result<i64, ApiError> {
    let credentials = match found {
        Ok(credentials) => credentials,
        Err(StoreError::NotFound) => return Err(ApiError::not_found("Password not found")),
        Err(err) => return Err(err.into()),
    };

    if !otp::verify_secret(&credentials.password_hash, presented).await? {
        return Err(ApiError::bad_request("Password is not match"));
    }
    Ok(credentials.account_id)
}

#[tracing::instrument(name = "POST /auth/login", skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<Json<Envelope<LoginResponse>>, ApiError> {
    if body.email.trim().is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }

    let found = state.accounts.user_credentials(body.email.trim()).await;
    let subject = check_password(found, &body.password).await?;
    let token = state.tokens.issue(subject)?;

    tracing::info!(subject, "User logged in");
    Ok(Envelope::with_data(
        "Login successful",
        LoginResponse { token },
    ))
}

#[tracing::instrument(name = "POST /auth/admin_login", skip(state, body))]
pub async fn admin_login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<AdminLoginRequest>,
) -> Result<Json<Envelope<LoginResponse>>, ApiError> {
    if body.username.trim().is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }

    let found = state.accounts.admin_credentials(body.username.trim()).await;
    let subject = check_password(found, &body.password).await?;
    let token = state.tokens.issue(subject)?;

    tracing::info!(subject, "Admin logged in");
    Ok(Envelope::with_data(
        "Admin login successful",
        LoginResponse { token },
    ))
}
