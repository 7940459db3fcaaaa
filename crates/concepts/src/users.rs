//! Users table.
//!
//! `username` is stored normalized (NFKC, lowercase), so lookups are
//! case-insensitive.

use engine::{Record, record};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub token: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Public view of the user. Credentials never leave the concept.
    pub fn user_info(&self) -> Record {
        record! {
            "_id" => self.id.clone(),
            "username" => self.username.clone(),
            "displayName" => self.display_name.clone(),
        }
    }
}
