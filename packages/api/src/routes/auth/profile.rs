use axum::{Extension, Json, extract::State};
use serde::Serialize;

use crate::{
    error::ApiError, middleware::AuthContext, routes::Envelope, state::AppState,
    store::StoreError,
};

#[derive(Debug, Clone, Serialize)]
pub struct DisplayNameResponse {
    pub display_name: String,
}

#[tracing::instrument(name = "GET /auth/display_name", skip(state, ctx))]
pub async fn display_name(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Envelope<DisplayNameResponse>>, ApiError> {
    let account_id = ctx.subject()?;
    let display_name = match state.accounts.display_name(account_id).await {
        Ok(name) => name,
        Err(StoreError::NotFound) => return Err(ApiError::not_found("Account not found")),
        Err(err) => return Err(err.into()),
    };

    Ok(Envelope::with_data(
        "Fetched display name successfully",
        DisplayNameResponse { display_name },
    ))
}

#[cfg(test)]
mod tests {
    use crate::construct_router;
    use crate::testing::{Harness, get, get_with_auth, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn users_see_their_email_and_admins_their_username() {
        let h = Harness::new();
        let user = h.accounts.add_user("reader@example.com", "pw");
        let admin = h.accounts.add_admin("root", "pw");
        let app = construct_router(h.state.clone());

        let (status, body) =
            send(&app, get_with_auth("/auth/display_name", &h.bearer(user))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["display_name"], "reader@example.com");

        let (_, body) = send(&app, get_with_auth("/auth/display_name", &h.bearer(admin))).await;
        assert_eq!(body["data"]["display_name"], "root");
    }

    #[tokio::test]
    async fn anonymous_callers_are_rejected() {
        let h = Harness::new();
        let app = construct_router(h.state.clone());

        let (status, _) = send(&app, get("/auth/display_name")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
