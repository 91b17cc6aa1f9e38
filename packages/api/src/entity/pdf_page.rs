use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "pdf_page")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub pdf_id: i32,
    pub page_number: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pdf::Entity",
        from = "Column::PdfId",
        to = "super::pdf::Column::Id",
        on_delete = "Cascade"
    )]
    Pdf,
    #[sea_orm(has_many = "super::pdf_paragraph::Entity")]
    PdfParagraph,
    #[sea_orm(has_many = "super::pdf_image::Entity")]
    PdfImage,
}

impl Related<super::pdf::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pdf.def()
    }
}

impl Related<super::pdf_paragraph::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PdfParagraph.def()
    }
}

impl Related<super::pdf_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PdfImage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
