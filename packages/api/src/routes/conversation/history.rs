use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::{
    error::ApiError,
    middleware::AuthContext,
    routes::Envelope,
    state::AppState,
    store::{RECENT_CONVERSATIONS, StoreError, StoredExchange},
};

#[derive(Debug, Clone, Serialize)]
pub struct ExchangeView {
    pub id: i32,
    pub request: String,
    pub response: String,
    pub created_time: String,
    pub images: Vec<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub title: String,
    pub device_id: Option<i32>,
    pub pairs: Vec<ExchangeView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub conversation_title: String,
    pub device_name: String,
    pub conversation_updated_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationList {
    pub conversations: Vec<ConversationSummary>,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl From<StoredExchange> for ExchangeView {
    fn from(exchange: StoredExchange) -> Self {
        Self {
            id: exchange.id,
            request: exchange.request,
            response: exchange.response,
            created_time: exchange.created_at.map(timestamp).unwrap_or_default(),
            images: exchange.image_ids,
        }
    }
}

/// Admins may read any conversation. Users only see their own, anything else
/// is reported as missing.
#[tracing::instrument(name = "GET /conversation/{id}", skip(state, ctx))]
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Envelope<ConversationView>>, ApiError> {
    let account_id = ctx.subject()?;

    let history = match state.conversations.conversation_history(&conversation_id).await {
        Ok(history) => history,
        Err(StoreError::NotFound) => return Err(ApiError::not_found("Conversation not found")),
        Err(err) => return Err(err.into()),
    };

    let is_admin = ctx.role.as_deref() == Some("admin");
    if history.account_id != account_id && !is_admin {
        return Err(ApiError::not_found("Conversation not found"));
    }

    Ok(Envelope::with_data(
        "Fetched conversation successfully",
        ConversationView {
            title: history.title,
            device_id: history.device_id,
            pairs: history.exchanges.into_iter().map(Into::into).collect(),
        },
    ))
}

#[tracing::instrument(name = "GET /conversation/list", skip(state, ctx))]
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Envelope<ConversationList>>, ApiError> {
    let account_id = ctx.subject()?;
    let recent = state
        .conversations
        .recent_conversations(account_id, RECENT_CONVERSATIONS)
        .await?;

    Ok(Envelope::with_data(
        "Fetched conversations successfully",
        ConversationList {
            conversations: recent
                .into_iter()
                .map(|c| ConversationSummary {
                    conversation_id: c.id,
                    conversation_title: c.title,
                    device_name: c.device_name,
                    conversation_updated_time: timestamp(c.updated_at),
                })
                .collect(),
        },
    ))
}
