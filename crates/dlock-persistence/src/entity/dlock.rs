//! Distributed lock entity
//!
//! `expire_at` holds seconds since the Unix epoch.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "dlock")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: Option<DateTime>,
    pub deleted_at: Option<DateTime>,
    #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
    pub name: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
    pub lock_resource: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
    pub host: Option<String>,
    pub expire_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
