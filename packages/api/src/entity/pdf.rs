//! `SeaORM` Entity for pdf
//!
//! Uploaded manuals. `ocr_flag` flips to true once extraction results are stored.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "pdf")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Object key of the PDF in the storage bucket
    #[sea_orm(column_type = "Text")]
    pub gcs_bucket: String,
    pub device_id: Option<i32>,
    pub ocr_flag: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub filename: Option<String>,
    pub uploaded_at: Option<DateTime>,
    pub last_access: Option<DateTime>,
    pub number_of_pages: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::pdf_page::Entity")]
    PdfPage,
}

impl Related<super::pdf_page::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PdfPage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
