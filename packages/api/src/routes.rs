use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ApiError;

pub mod auth;
pub mod conversation;
pub mod health;
pub mod pdf_process;

/// Success body shared by every route.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Envelope {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Envelope {
            success: true,
            message: message.into(),
            data: None,
        })
    }
}

/// `Json` that rejects with the error envelope instead of axum's plain-text body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                ApiError::bad_request(format!("Invalid request: {}", rejection.body_text()))
            })?;
        Ok(JsonBody(value))
    }
}
