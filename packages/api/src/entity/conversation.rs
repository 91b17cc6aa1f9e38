//! `SeaORM` Entity for conversation
//!
//! The id is a hex SHA-256 of the owner's account id and creation time.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "conversation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    pub account_id: i32,
    pub created_time: DateTime,
    pub updated_time: Option<DateTime>,
    #[sea_orm(column_type = "Text", nullable)]
    pub title: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::request_response_pair::Entity")]
    RequestResponsePair,
}

impl Related<super::request_response_pair::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestResponsePair.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
