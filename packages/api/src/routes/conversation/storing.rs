use axum::{Extension, Json, body::Bytes, extract::State};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::ApiError, middleware::AuthContext, routes::Envelope, state::AppState,
    store::NewConversation,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoringRequest {
    pub device_id: Option<i32>,
    /// First user message. Summarized into the conversation title.
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredConversationResponse {
    pub conversation_id: String,
    pub title: String,
    pub device_name: String,
    pub conversation_updated_time: String,
}

/// Hex SHA-256 of the account id followed by the RFC 3339 creation time.
pub fn conversation_id(account_id: i64, created_at: DateTime<Utc>) -> String {
    let raw = format!(
        "{}{}",
        account_id,
        created_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    hex::encode(Sha256::digest(raw.as_bytes()))
}

async fn summarized_title(state: &AppState, query: Option<&str>) -> String {
    let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
        return String::new();
    };

    match state.inference.summarize(query).await {
        Ok(summary) => summary.trim().to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "Title summary failed, storing untitled conversation");
            String::new()
        }
    }
}

#[tracing::instrument(name = "POST /conversation/storing", skip(state, ctx, body))]
pub async fn store_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Result<Json<Envelope<StoredConversationResponse>>, ApiError> {
    let account_id = ctx.subject()?;
    // The body is optional, an unreadable one counts as empty.
    let request: StoringRequest = serde_json::from_slice(&body).unwrap_or_default();

    let created_at = Utc::now();
    let id = conversation_id(account_id, created_at);
    let title = summarized_title(&state, request.query.as_deref()).await;

    let stored = state
        .conversations
        .create_conversation(NewConversation {
            id,
            account_id,
            title,
            device_id: request.device_id,
            created_at,
        })
        .await?;

    tracing::info!(conversation_id = %stored.id, "Conversation stored");
    Ok(Envelope::with_data(
        "Conversation stored successfully",
        StoredConversationResponse {
            conversation_id: stored.id,
            title: stored.title,
            device_name: stored.device_name,
            conversation_updated_time: stored
                .updated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        },
    ))
}
