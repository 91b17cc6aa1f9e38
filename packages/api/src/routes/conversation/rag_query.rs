use axum::{Extension, Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    inference::RagAnswer,
    middleware::AuthContext,
    routes::{Envelope, JsonBody},
    state::AppState,
    store::Exchange,
};

#[derive(Debug, Clone, Deserialize)]
pub struct RagQueryRequest {
    #[serde(default)]
    pub query: String,
    pub conversation_id: Option<String>,
    pub device_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagQueryResponse {
    pub response: String,
    pub images_ids: Vec<i32>,
    /// Set only when the exchange was stored.
    pub pair_id: Option<i32>,
}

/// Stores the exchange if possible. Storage failures never fail the query.
async fn record(
    state: &AppState,
    conversation_id: String,
    request: &str,
    answer: &RagAnswer,
) -> Option<i32> {
    let exchange = Exchange {
        conversation_id,
        request: request.to_string(),
        response: answer.response.clone(),
        image_ids: answer.image_ids.clone(),
        created_at: Utc::now(),
    };

    match state.conversations.record_exchange(exchange).await {
        Ok(pair_id) => Some(pair_id),
        Err(err) => {
            tracing::warn!(error = %err, "Could not store request/response pair");
            None
        }
    }
}

#[tracing::instrument(name = "POST /conversation/rag_query", skip(state, ctx, body))]
pub async fn rag_query(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    JsonBody(body): JsonBody<RagQueryRequest>,
) -> Result<Json<Envelope<RagQueryResponse>>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError::bad_request("Query is required"));
    }

    let answer = state.inference.rag_query(&body.query, body.device_id).await?;

    let conversation_id = body.conversation_id.filter(|id| !id.is_empty());
    let pair_id = match conversation_id {
        Some(conversation_id) if ctx.authenticated => {
            record(&state, conversation_id, &body.query, &answer).await
        }
        _ => None,
    };

    Ok(Envelope::with_data(
        "LLM response fetched successfully",
        RagQueryResponse {
            response: answer.response,
            images_ids: answer.image_ids,
            pair_id,
        },
    ))
}
