//! In-memory doubles for the store, inference and mail seams.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use tokio::sync::{Notify, Semaphore, mpsc};
use tower::ServiceExt;

use crate::{
    extraction::{FatalError, WatchdogConfig},
    inference::{
        ExtractionDocument, ExtractionOutput, InferenceBackend, InferenceError, RagAnswer,
    },
    mail::{EmailMessage, MailClient, MailError},
    otp::{self, OtpReplayPolicy, OtpTable, StoredOtp},
    state::{Backends, State},
    store::{
        AccountStore, ConversationHistory, ConversationStore, Credentials, Exchange,
        GLOBAL_DEVICE_SCOPE, NewConversation, PdfRecord, PdfStore, StoreError, StoreResult,
        StoredConversation, StoredExchange,
    },
    token::TokenService,
};

pub const TEST_JWT_KEY: &str = "test-signing-key";

#[derive(Debug, Clone)]
struct MemoryUser {
    id: i64,
    password_hash: Option<String>,
    otp: Option<StoredOtp>,
}

#[derive(Debug, Clone)]
struct PendingRegistration {
    password_hash: String,
    otp: Option<StoredOtp>,
}

#[derive(Debug, Default)]
struct AccountTables {
    roles: HashMap<i64, String>,
    users: HashMap<String, MemoryUser>,
    pending: HashMap<String, PendingRegistration>,
    admins: HashMap<String, Credentials>,
    next_id: i64,
    fail_role_lookups: bool,
}

impl AccountTables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    tables: Mutex<AccountTables>,
}

impl MemoryAccountStore {
    pub fn add_account(&self, id: i64, role: &str) {
        let mut tables = self.tables.lock().unwrap();
        tables.roles.insert(id, role.to_string());
        tables.next_id = tables.next_id.max(id);
    }

    pub fn add_user(&self, email: &str, password: &str) -> i64 {
        self.add_user_with_hash(email, otp::hash_blocking(password).unwrap())
    }

    pub fn add_user_with_hash(&self, email: &str, password_hash: String) -> i64 {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.allocate_id();
        tables.roles.insert(id, "user".to_string());
        tables.users.insert(
            email.to_string(),
            MemoryUser {
                id,
                password_hash: Some(password_hash),
                otp: None,
            },
        );
        id
    }

    pub fn add_admin(&self, username: &str, password: &str) -> i64 {
        self.add_admin_with_hash(username, otp::hash_blocking(password).unwrap())
    }

    pub fn add_admin_with_hash(&self, username: &str, password_hash: String) -> i64 {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.allocate_id();
        tables.roles.insert(id, "admin".to_string());
        tables.admins.insert(
            username.to_string(),
            Credentials {
                account_id: id,
                password_hash,
            },
        );
        id
    }

    pub fn fail_role_lookups(&self) {
        self.tables.lock().unwrap().fail_role_lookups = true;
    }

    pub fn otp(&self, table: OtpTable, email: &str) -> Option<StoredOtp> {
        let tables = self.tables.lock().unwrap();
        match table {
            OtpTable::Account => tables.users.get(email).and_then(|u| u.otp.clone()),
            OtpTable::PendingRegistration => tables.pending.get(email).and_then(|p| p.otp.clone()),
        }
    }

    /// Overwrites a stored OTP, e.g. to backdate it.
    pub fn set_otp(&self, table: OtpTable, email: &str, stored: StoredOtp) {
        let mut tables = self.tables.lock().unwrap();
        match table {
            OtpTable::Account => {
                if let Some(user) = tables.users.get_mut(email) {
                    user.otp = Some(stored);
                }
            }
            OtpTable::PendingRegistration => {
                if let Some(pending) = tables.pending.get_mut(email) {
                    pending.otp = Some(stored);
                }
            }
        }
    }

    pub fn is_pending(&self, email: &str) -> bool {
        self.tables.lock().unwrap().pending.contains_key(email)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn role_label(&self, account_id: i64) -> StoreResult<String> {
        let tables = self.tables.lock().unwrap();
        if tables.fail_role_lookups {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        tables
            .roles
            .get(&account_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn email_registered(&self, email: &str) -> StoreResult<bool> {
        Ok(self.tables.lock().unwrap().users.contains_key(email))
    }

    async fn user_credentials(&self, email: &str) -> StoreResult<Credentials> {
        let tables = self.tables.lock().unwrap();
        let user = tables.users.get(email).ok_or(StoreError::NotFound)?;
        Ok(Credentials {
            account_id: user.id,
            password_hash: user.password_hash.clone().ok_or(StoreError::NotFound)?,
        })
    }

    async fn admin_credentials(&self, username: &str) -> StoreResult<Credentials> {
        self.tables
            .lock()
            .unwrap()
            .admins
            .get(username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn stage_registration(
        &self,
        email: &str,
        password_hash: &str,
        otp: &StoredOtp,
    ) -> StoreResult<()> {
        self.tables.lock().unwrap().pending.insert(
            email.to_string(),
            PendingRegistration {
                password_hash: password_hash.to_string(),
                otp: Some(otp.clone()),
            },
        );
        Ok(())
    }

    async fn store_otp(&self, table: OtpTable, email: &str, otp: &StoredOtp) -> StoreResult<()> {
        self.set_otp(table, email, otp.clone());
        Ok(())
    }

    async fn load_otp(&self, table: OtpTable, email: &str) -> StoreResult<StoredOtp> {
        self.otp(table, email).ok_or(StoreError::NotFound)
    }

    async fn clear_otp(&self, table: OtpTable, email: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        match table {
            OtpTable::Account => {
                if let Some(user) = tables.users.get_mut(email) {
                    user.otp = None;
                }
            }
            OtpTable::PendingRegistration => {
                if let Some(pending) = tables.pending.get_mut(email) {
                    pending.otp = None;
                }
            }
        }
        Ok(())
    }

    async fn commit_registration(&self, email: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let pending = tables.pending.remove(email).ok_or(StoreError::NotFound)?;
        let id = tables.allocate_id();
        tables.roles.insert(id, "user".to_string());
        tables.users.insert(
            email.to_string(),
            MemoryUser {
                id,
                password_hash: Some(pending.password_hash),
                otp: None,
            },
        );
        Ok(())
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let user = tables.users.get_mut(email).ok_or(StoreError::NotFound)?;
        user.password_hash = Some(password_hash.to_string());
        Ok(())
    }

    async fn display_name(&self, account_id: i64) -> StoreResult<String> {
        let tables = self.tables.lock().unwrap();
        let admin = tables
            .admins
            .iter()
            .find(|(_, creds)| creds.account_id == account_id)
            .map(|(username, _)| username.clone());
        let user = tables
            .users
            .iter()
            .find(|(_, user)| user.id == account_id)
            .map(|(email, _)| email.clone());
        admin.or(user).ok_or(StoreError::NotFound)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPdfStore {
    pdfs: Mutex<HashMap<i32, PdfRecord>>,
    saved: Mutex<Vec<(i32, ExtractionDocument)>>,
}

impl MemoryPdfStore {
    pub fn add_pdf(&self, id: i32, gcs_bucket: &str) {
        self.pdfs.lock().unwrap().insert(
            id,
            PdfRecord {
                id,
                gcs_bucket: gcs_bucket.to_string(),
                ocr_flag: false,
                number_of_pages: None,
            },
        );
    }

    pub fn pdf(&self, id: i32) -> Option<PdfRecord> {
        self.pdfs.lock().unwrap().get(&id).cloned()
    }

    pub fn saved(&self) -> Vec<(i32, ExtractionDocument)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl PdfStore for MemoryPdfStore {
    async fn find_pdf(&self, pdf_id: i32) -> StoreResult<PdfRecord> {
        self.pdf(pdf_id).ok_or(StoreError::NotFound)
    }

    async fn save_extraction(
        &self,
        pdf_id: i32,
        document: &ExtractionDocument,
    ) -> StoreResult<()> {
        let mut pdfs = self.pdfs.lock().unwrap();
        let pdf = pdfs.get_mut(&pdf_id).ok_or(StoreError::NotFound)?;
        pdf.ocr_flag = true;
        pdf.number_of_pages = Some(document.pdf_number_of_pages);
        self.saved.lock().unwrap().push((pdf_id, document.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    device_labels: Mutex<HashMap<i32, String>>,
    conversations: Mutex<Vec<NewConversation>>,
    exchanges: Mutex<Vec<Exchange>>,
    fail_exchanges: AtomicBool,
}

impl MemoryConversationStore {
    pub fn add_device(&self, id: i32, label: &str) {
        self.device_labels
            .lock()
            .unwrap()
            .insert(id, label.to_string());
    }

    pub fn add_conversation(&self, id: &str, account_id: i64) {
        self.conversations.lock().unwrap().push(NewConversation {
            id: id.to_string(),
            account_id,
            title: String::new(),
            device_id: None,
            created_at: chrono::Utc::now(),
        });
    }

    pub fn add_titled_conversation(
        &self,
        id: &str,
        account_id: i64,
        title: &str,
        device_id: Option<i32>,
        created_at: chrono::DateTime<chrono::Utc>,
    ) {
        self.conversations.lock().unwrap().push(NewConversation {
            id: id.to_string(),
            account_id,
            title: title.to_string(),
            device_id,
            created_at,
        });
    }

    fn device_name(&self, device_id: Option<i32>) -> String {
        device_id
            .and_then(|id| self.device_labels.lock().unwrap().get(&id).cloned())
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| GLOBAL_DEVICE_SCOPE.to_string())
    }

    pub fn fail_exchanges(&self) {
        self.fail_exchanges.store(true, Ordering::SeqCst);
    }

    pub fn conversations(&self) -> Vec<NewConversation> {
        self.conversations.lock().unwrap().clone()
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(
        &self,
        conversation: NewConversation,
    ) -> StoreResult<StoredConversation> {
        let device_name = self.device_name(conversation.device_id);

        let stored = StoredConversation {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            device_name,
            updated_at: conversation.created_at,
        };
        self.conversations.lock().unwrap().push(conversation);
        Ok(stored)
    }

    async fn record_exchange(&self, exchange: Exchange) -> StoreResult<i32> {
        if self.fail_exchanges.load(Ordering::SeqCst) {
            return Err(StoreError::Database("insert failed".to_string()));
        }
        let known = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.id == exchange.conversation_id);
        if !known {
            return Err(StoreError::Database(
                "violates foreign key constraint on conversation_id".to_string(),
            ));
        }

        let mut exchanges = self.exchanges.lock().unwrap();
        exchanges.push(exchange);
        Ok(exchanges.len() as i32)
    }

    async fn conversation_history(
        &self,
        conversation_id: &str,
    ) -> StoreResult<ConversationHistory> {
        let conversation = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let exchanges = self
            .exchanges
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.conversation_id == conversation_id)
            .map(|(index, e)| StoredExchange {
                id: index as i32 + 1,
                request: e.request.clone(),
                response: e.response.clone(),
                created_at: Some(e.created_at),
                image_ids: e.image_ids.clone(),
            })
            .collect();

        Ok(ConversationHistory {
            id: conversation.id,
            account_id: conversation.account_id,
            title: conversation.title,
            device_id: conversation.device_id,
            exchanges,
        })
    }

    async fn recent_conversations(
        &self,
        account_id: i64,
        limit: u64,
    ) -> StoreResult<Vec<StoredConversation>> {
        let owned: Vec<NewConversation> = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect();
        let exchanges = self.exchanges();

        let mut recent: Vec<StoredConversation> = owned
            .into_iter()
            .map(|c| {
                let updated_at = exchanges
                    .iter()
                    .filter(|e| e.conversation_id == c.id)
                    .map(|e| e.created_at)
                    .fold(c.created_at, |latest, at| latest.max(at));
                StoredConversation {
                    device_name: self.device_name(c.device_id),
                    id: c.id,
                    title: c.title,
                    updated_at,
                }
            })
            .collect();
        recent.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}

#[derive(Debug, Default)]
struct InferenceScript {
    extraction_json: Option<String>,
    extraction_error: Option<String>,
    answer: Option<RagAnswer>,
    summary: Option<String>,
    extract_calls: Vec<String>,
    rag_calls: Vec<(String, Option<i32>)>,
}

/// Scriptable inference backend. Extractions can be held open until released.
#[derive(Debug)]
pub struct FakeInference {
    script: Mutex<InferenceScript>,
    hold: AtomicBool,
    started: Notify,
    release: Semaphore,
}

impl Default for FakeInference {
    fn default() -> Self {
        Self {
            script: Mutex::new(InferenceScript::default()),
            hold: AtomicBool::new(false),
            started: Notify::new(),
            release: Semaphore::new(0),
        }
    }
}

impl FakeInference {
    pub fn set_extraction(&self, result_json: &str) {
        self.script.lock().unwrap().extraction_json = Some(result_json.to_string());
    }

    pub fn fail_extraction(&self, message: &str) {
        self.script.lock().unwrap().extraction_error = Some(message.to_string());
    }

    pub fn set_answer(&self, response: &str, image_ids: Vec<i32>) {
        self.script.lock().unwrap().answer = Some(RagAnswer {
            response: response.to_string(),
            image_ids,
        });
    }

    pub fn set_summary(&self, summary: &str) {
        self.script.lock().unwrap().summary = Some(summary.to_string());
    }

    pub fn hold_extractions(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held extraction has started.
    pub async fn extraction_started(&self) {
        self.started.notified().await;
    }

    pub fn release_extraction(&self) {
        self.release.add_permits(1);
    }

    pub fn extract_calls(&self) -> Vec<String> {
        self.script.lock().unwrap().extract_calls.clone()
    }

    pub fn rag_calls(&self) -> Vec<(String, Option<i32>)> {
        self.script.lock().unwrap().rag_calls.clone()
    }
}

#[async_trait]
impl InferenceBackend for FakeInference {
    async fn extract_pdf(
        &self,
        bucket_reference: &str,
    ) -> Result<ExtractionOutput, InferenceError> {
        self.script
            .lock()
            .unwrap()
            .extract_calls
            .push(bucket_reference.to_string());

        if self.hold.load(Ordering::SeqCst) {
            self.started.notify_one();
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
        }

        let script = self.script.lock().unwrap();
        if let Some(message) = &script.extraction_error {
            return Err(InferenceError::Status {
                code: "Internal".to_string(),
                message: message.clone(),
            });
        }
        Ok(ExtractionOutput {
            result_json: script
                .extraction_json
                .clone()
                .unwrap_or_else(|| r#"{"pages":[],"pdf_number_of_pages":0}"#.to_string()),
        })
    }

    async fn rag_query(
        &self,
        query: &str,
        device_id: Option<i32>,
    ) -> Result<RagAnswer, InferenceError> {
        let mut script = self.script.lock().unwrap();
        script.rag_calls.push((query.to_string(), device_id));
        script.answer.clone().ok_or_else(|| InferenceError::Status {
            code: "Unavailable".to_string(),
            message: "no answer scripted".to_string(),
        })
    }

    async fn summarize(&self, _query: &str) -> Result<String, InferenceError> {
        self.script
            .lock()
            .unwrap()
            .summary
            .clone()
            .ok_or_else(|| InferenceError::Status {
                code: "Unavailable".to_string(),
                message: "no summary scripted".to_string(),
            })
    }
}

#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Code from the most recent OTP mail to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|message| message.to == to)
            .and_then(|message| message.body_text.as_deref())
            .and_then(|text| text.strip_prefix("Your OTP code is: "))
            .map(str::to_string)
    }
}

#[async_trait]
impl MailClient for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("relay refused connection".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn from_email(&self) -> &str {
        "noreply@example.com"
    }

    fn from_name(&self) -> &str {
        "Gateway"
    }
}

/// A fully wired [`State`] over in-memory doubles.
pub struct Harness {
    pub state: Arc<State>,
    pub tokens: TokenService,
    pub accounts: Arc<MemoryAccountStore>,
    pub pdfs: Arc<MemoryPdfStore>,
    pub conversations: Arc<MemoryConversationStore>,
    pub inference: Arc<FakeInference>,
    pub mailer: Arc<RecordingMailer>,
    pub fatal: mpsc::UnboundedReceiver<FatalError>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(OtpReplayPolicy::default(), WatchdogConfig::default())
    }

    pub fn with(otp_policy: OtpReplayPolicy, watchdog: WatchdogConfig) -> Self {
        let accounts = Arc::new(MemoryAccountStore::default());
        let pdfs = Arc::new(MemoryPdfStore::default());
        let conversations = Arc::new(MemoryConversationStore::default());
        let inference = Arc::new(FakeInference::default());
        let mailer = Arc::new(RecordingMailer::default());
        let (fatal_tx, fatal) = mpsc::unbounded_channel();

        let backends = Backends {
            db: None,
            accounts: accounts.clone(),
            pdfs: pdfs.clone(),
            conversations: conversations.clone(),
            inference: inference.clone(),
            mail_client: mailer.clone(),
        };
        let state = State::new(
            TokenService::new(TEST_JWT_KEY).unwrap(),
            otp_policy,
            watchdog,
            backends,
            fatal_tx,
        );

        Self {
            state: Arc::new(state),
            tokens: TokenService::new(TEST_JWT_KEY).unwrap(),
            accounts,
            pdfs,
            conversations,
            inference,
            mailer,
            fatal,
        }
    }

    pub fn bearer(&self, subject: i64) -> String {
        format!("Bearer {}", self.tokens.issue(subject).unwrap())
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn get_with_auth(uri: &str, authorization: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, authorization)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Drives one request through the router and decodes the JSON body.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, body)
}
