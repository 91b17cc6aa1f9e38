use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "pdf_image")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub pdf_page_id: i32,
    /// Position of the image on its page
    pub sequence: i32,
    #[sea_orm(column_type = "Text")]
    pub gcs_bucket: String,
    pub last_modified: DateTime,
    #[sea_orm(column_type = "Text", nullable)]
    pub alt: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pdf_page::Entity",
        from = "Column::PdfPageId",
        to = "super::pdf_page::Column::Id",
        on_delete = "Cascade"
    )]
    PdfPage,
}

impl Related<super::pdf_page::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PdfPage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
