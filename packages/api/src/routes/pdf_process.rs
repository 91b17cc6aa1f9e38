use axum::{Router, routing::get};

use crate::state::AppState;

pub mod extract;
pub mod status;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/extract_pdf", get(extract::extract_pdf))
        .route(
            "/agent_is_extracting_status",
            get(status::agent_is_extracting_status),
        )
}
