//! `SeaORM` Entity for temp_user
//!
//! Registrations waiting for their email to be confirmed. One row per email,
//! overwritten by every new registration attempt.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "temp_user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub email: String,
    #[sea_orm(column_type = "Text")]
    #[serde(skip_serializing)]
    pub password: String,
    #[sea_orm(column_type = "Text", nullable)]
    #[serde(skip_serializing)]
    pub otp: Option<String>,
    pub otp_generated_time: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
