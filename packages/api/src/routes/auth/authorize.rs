use axum::{Extension, Json};

use crate::{error::ApiError, middleware::AuthContext, routes::Envelope};

#[tracing::instrument(name = "POST /auth/admin_authorize", skip(ctx))]
pub async fn admin_authorize(
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Envelope<()>>, ApiError> {
    ctx.subject()?;
    Ok(Envelope::message("Admin authorization successful"))
}

#[tracing::instrument(name = "POST /auth/client_authorize", skip(ctx))]
pub async fn client_authorize(
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Envelope<()>>, ApiError> {
    ctx.subject()?;
    Ok(Envelope::message("Client authorization successful"))
}
