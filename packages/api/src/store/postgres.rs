//! PostgreSQL stores using SeaORM
//!
//! Timestamps are stored as naive UTC, matching the existing schema.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    NotSet, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, Statement,
    TransactionTrait,
    sea_query::{Expr, OnConflict},
};

use super::{
    AccountStore, ConversationHistory, ConversationStore, Credentials, Exchange,
    GLOBAL_DEVICE_SCOPE, NewConversation, PdfRecord, PdfStore, StoreError, StoreResult,
    StoredConversation, StoredExchange,
};
use crate::{
    entity::{
        account, admin, conversation, device, device_conversation, pdf, pdf_image, pdf_page,
        pdf_paragraph, request_response_pair, request_response_pair_pdf_image, role, temp_user,
        user,
    },
    inference::ExtractionDocument,
    otp::{OtpTable, StoredOtp},
};

fn account_key(account_id: i64) -> StoreResult<i32> {
    i32::try_from(account_id).map_err(|_| StoreError::NotFound)
}

fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

fn device_name(label: Option<String>) -> String {
    label
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| GLOBAL_DEVICE_SCOPE.to_string())
}

#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresAccountStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn role_label(&self, account_id: i64) -> StoreResult<String> {
        let id = account_key(account_id)?;

        let role = role::Entity::find()
            .join(
                sea_orm::JoinType::InnerJoin,
                role::Relation::Account.def(),
            )
            .filter(account::Column::Id.eq(id))
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(role.label)
    }

    async fn email_registered(&self, email: &str) -> StoreResult<bool> {
        let count = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }

    async fn user_credentials(&self, email: &str) -> StoreResult<Credentials> {
        let user = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound)?;

        let password_hash = user.password.ok_or(StoreError::NotFound)?;
        Ok(Credentials {
            account_id: i64::from(user.id),
            password_hash,
        })
    }

    async fn admin_credentials(&self, username: &str) -> StoreResult<Credentials> {
        let admin = admin::Entity::find()
            .join(
                sea_orm::JoinType::InnerJoin,
                admin::Relation::Account.def(),
            )
            .filter(account::Column::Username.eq(username))
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(Credentials {
            account_id: i64::from(admin.id),
            password_hash: admin.password,
        })
    }

    async fn stage_registration(
        &self,
        email: &str,
        password_hash: &str,
        otp: &StoredOtp,
    ) -> StoreResult<()> {
        let row = temp_user::ActiveModel {
            email: Set(email.to_string()),
            password: Set(password_hash.to_string()),
            otp: Set(Some(otp.hash.clone())),
            otp_generated_time: Set(Some(otp.generated_at.naive_utc())),
        };

        temp_user::Entity::insert(row)
            .on_conflict(
                OnConflict::column(temp_user::Column::Email)
                    .update_columns([
                        temp_user::Column::Password,
                        temp_user::Column::Otp,
                        temp_user::Column::OtpGeneratedTime,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        Ok(())
    }

    async fn store_otp(&self, table: OtpTable, email: &str, otp: &StoredOtp) -> StoreResult<()> {
        let generated_at = otp.generated_at.naive_utc();

        let result = match table {
            OtpTable::Account => {
                user::Entity::update_many()
                    .col_expr(user::Column::Otp, Expr::value(otp.hash.clone()))
                    .col_expr(user::Column::OtpGeneratedTime, Expr::value(generated_at))
                    .filter(user::Column::Email.eq(email))
                    .exec(&*self.db)
                    .await?
            }
            OtpTable::PendingRegistration => {
                temp_user::Entity::update_many()
                    .col_expr(temp_user::Column::Otp, Expr::value(otp.hash.clone()))
                    .col_expr(temp_user::Column::OtpGeneratedTime, Expr::value(generated_at))
                    .filter(temp_user::Column::Email.eq(email))
                    .exec(&*self.db)
                    .await?
            }
        };

        if result.rows_affected == 0 {
            tracing::debug!(?table, "No row to attach OTP to");
        }

        Ok(())
    }

    async fn load_otp(&self, table: OtpTable, email: &str) -> StoreResult<StoredOtp> {
        let (hash, generated_at) = match table {
            OtpTable::Account => {
                let row = user::Entity::find()
                    .filter(user::Column::Email.eq(email))
                    .one(&*self.db)
                    .await?
                    .ok_or(StoreError::NotFound)?;
                (row.otp, row.otp_generated_time)
            }
            OtpTable::PendingRegistration => {
                let row = temp_user::Entity::find_by_id(email.to_string())
                    .one(&*self.db)
                    .await?
                    .ok_or(StoreError::NotFound)?;
                (row.otp, row.otp_generated_time)
            }
        };

        match (hash, generated_at) {
            (Some(hash), Some(generated_at)) => Ok(StoredOtp {
                hash,
                generated_at: to_utc(generated_at),
            }),
            _ => Err(StoreError::NotFound),
        }
    }

    async fn clear_otp(&self, table: OtpTable, email: &str) -> StoreResult<()> {
        match table {
            OtpTable::Account => {
                user::Entity::update_many()
                    .col_expr(user::Column::Otp, Expr::value(Option::<String>::None))
                    .col_expr(
                        user::Column::OtpGeneratedTime,
                        Expr::value(Option::<NaiveDateTime>::None),
                    )
                    .filter(user::Column::Email.eq(email))
                    .exec(&*self.db)
                    .await?;
            }
            OtpTable::PendingRegistration => {
                temp_user::Entity::update_many()
                    .col_expr(temp_user::Column::Otp, Expr::value(Option::<String>::None))
                    .col_expr(
                        temp_user::Column::OtpGeneratedTime,
                        Expr::value(Option::<NaiveDateTime>::None),
                    )
                    .filter(temp_user::Column::Email.eq(email))
                    .exec(&*self.db)
                    .await?;
            }
        }

        Ok(())
    }

    async fn commit_registration(&self, email: &str) -> StoreResult<()> {
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT proc_create_account_and_user($1)",
            [email.into()],
        );
        self.db.execute(statement).await?;
        Ok(())
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> StoreResult<()> {
        let result = user::Entity::update_many()
            .col_expr(user::Column::Password, Expr::value(password_hash.to_string()))
            .filter(user::Column::Email.eq(email))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn display_name(&self, account_id: i64) -> StoreResult<String> {
        let id = account_key(account_id)?;
        let account = account::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound)?;

        if let Some(username) = account
            .username
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
        {
            return Ok(username);
        }

        let user = user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(user.email)
    }
}

#[derive(Debug, Clone)]
pub struct PostgresPdfStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresPdfStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PdfStore for PostgresPdfStore {
    async fn find_pdf(&self, pdf_id: i32) -> StoreResult<PdfRecord> {
        let pdf = pdf::Entity::find_by_id(pdf_id)
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(PdfRecord {
            id: pdf.id,
            gcs_bucket: pdf.gcs_bucket,
            ocr_flag: pdf.ocr_flag,
            number_of_pages: pdf.number_of_pages,
        })
    }

    async fn save_extraction(
        &self,
        pdf_id: i32,
        document: &ExtractionDocument,
    ) -> StoreResult<()> {
        let txn = self.db.begin().await?;
        let now = Utc::now().naive_utc();

        for entry in &document.pages {
            let page = &entry.page;

            let stored_page = pdf_page::ActiveModel {
                id: NotSet,
                pdf_id: Set(pdf_id),
                page_number: Set(page.page_number),
            }
            .insert(&txn)
            .await?;

            pdf_paragraph::ActiveModel {
                id: NotSet,
                pdf_page_id: Set(stored_page.id),
                context: Set(page.paragraph.clone()),
                last_modified: Set(now),
            }
            .insert(&txn)
            .await?;

            for img in &page.imgs {
                pdf_image::ActiveModel {
                    id: NotSet,
                    pdf_page_id: Set(stored_page.id),
                    sequence: Set(img.order),
                    gcs_bucket: Set(img.gcs_bucket_name.clone()),
                    last_modified: Set(now),
                    alt: Set(None),
                }
                .insert(&txn)
                .await?;
            }
        }

        let updated = pdf::Entity::update_many()
            .col_expr(pdf::Column::OcrFlag, Expr::value(true))
            .col_expr(
                pdf::Column::NumberOfPages,
                Expr::value(document.pdf_number_of_pages),
            )
            .filter(pdf::Column::Id.eq(pdf_id))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        txn.commit().await?;
        tracing::info!(
            pdf_id,
            pages = document.pages.len(),
            "Stored extraction result"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConversationStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresConversationStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for PostgresConversationStore {
    async fn create_conversation(
        &self,
        new: NewConversation,
    ) -> StoreResult<StoredConversation> {
        let account_id = account_key(new.account_id)?;
        let created = new.created_at.naive_utc();
        let txn = self.db.begin().await?;

        conversation::ActiveModel {
            id: Set(new.id.clone()),
            account_id: Set(account_id),
            created_time: Set(created),
            updated_time: Set(Some(created)),
            title: Set(Some(new.title.clone())),
        }
        .insert(&txn)
        .await?;

        let mut label = None;
        if let Some(device_id) = new.device_id {
            device_conversation::Entity::insert(device_conversation::ActiveModel {
                conversation_id: Set(new.id.clone()),
                device_id: Set(device_id),
            })
            .exec_without_returning(&txn)
            .await?;

            label = device::Entity::find_by_id(device_id)
                .select_only()
                .column(device::Column::Label)
                .into_tuple::<Option<String>>()
                .one(&txn)
                .await?
                .flatten();
        }

        txn.commit().await?;

        Ok(StoredConversation {
            id: new.id,
            title: new.title,
            device_name: device_name(label),
            updated_at: new.created_at,
        })
    }

    async fn record_exchange(&self, exchange: Exchange) -> StoreResult<i32> {
        let created = exchange.created_at.naive_utc();
        let txn = self.db.begin().await?;

        let pair = request_response_pair::ActiveModel {
            id: NotSet,
            request: Set(exchange.request),
            response: Set(exchange.response),
            conversation_id: Set(exchange.conversation_id.clone()),
            created_time: Set(Some(created)),
        }
        .insert(&txn)
        .await?;

        if !exchange.image_ids.is_empty() {
            let links = exchange.image_ids.iter().map(|image_id| {
                request_response_pair_pdf_image::ActiveModel {
                    request_response_pair_id: Set(pair.id),
                    pdf_image_id: Set(*image_id),
                }
            });
            request_response_pair_pdf_image::Entity::insert_many(links)
                .exec_without_returning(&txn)
                .await?;
        }

        conversation::Entity::update_many()
            .col_expr(conversation::Column::UpdatedTime, Expr::value(created))
            .filter(conversation::Column::Id.eq(exchange.conversation_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(pair.id)
    }

    async fn conversation_history(
        &self,
        conversation_id: &str,
    ) -> StoreResult<ConversationHistory> {
        let conversation = conversation::Entity::find_by_id(conversation_id.to_string())
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound)?;

        let device_id = device_conversation::Entity::find()
            .filter(device_conversation::Column::ConversationId.eq(conversation_id))
            .one(&*self.db)
            .await?
            .map(|link| link.device_id);

        let pairs = request_response_pair::Entity::find()
            .filter(request_response_pair::Column::ConversationId.eq(conversation_id))
            .order_by_asc(request_response_pair::Column::Id)
            .all(&*self.db)
            .await?;

        let mut images: HashMap<i32, Vec<i32>> = HashMap::new();
        if !pairs.is_empty() {
            let links = request_response_pair_pdf_image::Entity::find()
                .filter(
                    request_response_pair_pdf_image::Column::RequestResponsePairId
                        .is_in(pairs.iter().map(|pair| pair.id)),
                )
                .order_by_asc(request_response_pair_pdf_image::Column::PdfImageId)
                .all(&*self.db)
                .await?;
            for link in links {
                images
                    .entry(link.request_response_pair_id)
                    .or_default()
                    .push(link.pdf_image_id);
            }
        }

        let exchanges = pairs
            .into_iter()
            .map(|pair| StoredExchange {
                image_ids: images.remove(&pair.id).unwrap_or_default(),
                id: pair.id,
                request: pair.request,
                response: pair.response,
                created_at: pair.created_time.map(to_utc),
            })
            .collect();

        Ok(ConversationHistory {
            id: conversation.id,
            account_id: i64::from(conversation.account_id),
            title: conversation.title.unwrap_or_default(),
            device_id,
            exchanges,
        })
    }

    async fn recent_conversations(
        &self,
        account_id: i64,
        limit: u64,
    ) -> StoreResult<Vec<StoredConversation>> {
        let account_id = account_key(account_id)?;
        let rows = conversation::Entity::find()
            .filter(conversation::Column::AccountId.eq(account_id))
            .filter(conversation::Column::UpdatedTime.is_not_null())
            .order_by_desc(conversation::Column::UpdatedTime)
            .limit(limit)
            .all(&*self.db)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let links = device_conversation::Entity::find()
            .filter(
                device_conversation::Column::ConversationId
                    .is_in(rows.iter().map(|row| row.id.clone())),
            )
            .all(&*self.db)
            .await?;

        let mut labels: HashMap<i32, Option<String>> = HashMap::new();
        if !links.is_empty() {
            let devices = device::Entity::find()
                .filter(device::Column::Id.is_in(links.iter().map(|link| link.device_id)))
                .all(&*self.db)
                .await?;
            labels.extend(devices.into_iter().map(|device| (device.id, device.label)));
        }

        let device_of: HashMap<String, i32> = links
            .into_iter()
            .map(|link| (link.conversation_id, link.device_id))
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let updated_at = to_utc(row.updated_time?);
                let label = device_of
                    .get(&row.id)
                    .and_then(|device_id| labels.get(device_id).cloned())
                    .flatten();
                Some(StoredConversation {
                    id: row.id,
                    title: row.title.unwrap_or_default(),
                    device_name: device_name(label),
                    updated_at,
                })
            })
            .collect())
    }
}
