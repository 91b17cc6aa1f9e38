use axum::{Json, extract::State};

use crate::{
    error::ApiError, extraction::ExtractionStatus, routes::Envelope, state::AppState,
};

#[tracing::instrument(name = "GET /pdf_process/agent_is_extracting_status", skip(state))]
pub async fn agent_is_extracting_status(
    State(state): State<AppState>,
) -> Result<Json<Envelope<ExtractionStatus>>, ApiError> {
    let status = state.watchdog.check_status();
    let message = if status.extracting {
        "Agent is extracting"
    } else {
        "Agent is idle"
    };
    Ok(Envelope::with_data(message, status))
}
