use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "request_response_pair_pdf_image")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub request_response_pair_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub pdf_image_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
