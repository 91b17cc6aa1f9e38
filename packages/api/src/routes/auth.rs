use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use crate::{
    middleware::{RoleSet, require_roles},
    state::AppState,
};

pub mod authorize;
pub mod login;
pub mod password;
pub mod profile;
pub mod registration;

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin_only = Router::new()
        .route("/admin_authorize", post(authorize::admin_authorize))
        .route_layer(from_fn_with_state(
            state.auth.guard(RoleSet::ADMIN),
            require_roles,
        ));

    let user_only = Router::new()
        .route("/client_authorize", post(authorize::client_authorize))
        .route_layer(from_fn_with_state(
            state.auth.guard(RoleSet::USER),
            require_roles,
        ));

    let members = Router::new()
        .route("/display_name", get(profile::display_name))
        .route_layer(from_fn_with_state(
            state.auth.guard(RoleSet::USER_OR_ADMIN),
            require_roles,
        ));

    Router::new()
        .route(
            "/unverified_register",
            post(registration::unverified_register),
        )
        .route(
            "/verify_registration",
            post(registration::verify_registration),
        )
        .route(
            "/resend_otp_registration",
            post(registration::resend_otp_registration),
        )
        .route("/login", post(login::login))
        .route("/admin_login", post(login::admin_login))
        .route("/can_reset_password", post(password::can_reset_password))
        .route("/reset_password", post(password::reset_password))
        .route(
            "/resend_otp_reset_password",
            post(password::resend_otp_reset_password),
        )
        .route("/verify_otp", post(password::verify_otp))
        .merge(admin_only)
        .merge(user_only)
        .merge(members)
}
