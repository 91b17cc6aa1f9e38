//! Persistence seams for the gateway.
//!
//! Handlers only see these traits. [`postgres`] implements them on top of SeaORM.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    inference::ExtractionDocument,
    otp::{OtpTable, StoredOtp},
};

mod postgres;

pub use postgres::{PostgresAccountStore, PostgresConversationStore, PostgresPdfStore};

/// Shown for conversations not tied to a device.
pub const GLOBAL_DEVICE_SCOPE: &str = "Global Devices Scope";

/// How many conversations the recent list returns.
pub const RECENT_CONVERSATIONS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::RecordNotFound(_) => StoreError::NotFound,
            other => StoreError::Database(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: i64,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfRecord {
    pub id: i32,
    pub gcs_bucket: String,
    pub ocr_flag: bool,
    pub number_of_pages: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub id: String,
    pub account_id: i64,
    pub title: String,
    pub device_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConversation {
    pub id: String,
    pub title: String,
    pub device_name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub conversation_id: String,
    pub request: String,
    pub response: String,
    pub image_ids: Vec<i32>,
    pub created_at: DateTime<Utc>,
}

/// A conversation with its full exchange history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    pub id: String,
    pub account_id: i64,
    pub title: String,
    pub device_id: Option<i32>,
    pub exchanges: Vec<StoredExchange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredExchange {
    pub id: i32,
    pub request: String,
    pub response: String,
    pub created_at: Option<DateTime<Utc>>,
    pub image_ids: Vec<i32>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// `NotFound` if the account or its role does not exist.
    async fn role_label(&self, account_id: i64) -> StoreResult<String>;

    async fn email_registered(&self, email: &str) -> StoreResult<bool>;

    async fn user_credentials(&self, email: &str) -> StoreResult<Credentials>;

    async fn admin_credentials(&self, username: &str) -> StoreResult<Credentials>;

    /// Upserts the pending registration for `email`.
    async fn stage_registration(
        &self,
        email: &str,
        password_hash: &str,
        otp: &StoredOtp,
    ) -> StoreResult<()>;

    /// Overwrites the OTP of an existing row. A missing row is not an error.
    async fn store_otp(&self, table: OtpTable, email: &str, otp: &StoredOtp) -> StoreResult<()>;

    async fn load_otp(&self, table: OtpTable, email: &str) -> StoreResult<StoredOtp>;

    async fn clear_otp(&self, table: OtpTable, email: &str) -> StoreResult<()>;

    /// Promotes a pending registration to a permanent user account.
    async fn commit_registration(&self, email: &str) -> StoreResult<()>;

    async fn update_password(&self, email: &str, password_hash: &str) -> StoreResult<()>;

    /// The account's username, or the user's email when no username is set.
    async fn display_name(&self, account_id: i64) -> StoreResult<String>;
}

#[async_trait]
pub trait PdfStore: Send + Sync {
    async fn find_pdf(&self, pdf_id: i32) -> StoreResult<PdfRecord>;

    /// Pages, paragraphs and images of one extraction, then the PDF's OCR flag and
    /// page count. All or nothing.
    async fn save_extraction(&self, pdf_id: i32, document: &ExtractionDocument)
    -> StoreResult<()>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        conversation: NewConversation,
    ) -> StoreResult<StoredConversation>;

    /// Returns the id of the stored request/response pair.
    async fn record_exchange(&self, exchange: Exchange) -> StoreResult<i32>;

    async fn conversation_history(&self, conversation_id: &str)
    -> StoreResult<ConversationHistory>;

    /// Most recently updated first, at most `limit`.
    async fn recent_conversations(
        &self,
        account_id: i64,
        limit: u64,
    ) -> StoreResult<Vec<StoredConversation>>;
}

pub type DynAccountStore = Arc<dyn AccountStore>;
pub type DynPdfStore = Arc<dyn PdfStore>;
pub type DynConversationStore = Arc<dyn ConversationStore>;
