//! Folders table: a per-owner tree. `parent` is `None` for top-level folders.

use engine::{Record, Value, record};
use sea_orm::entity::prelude::*;

/// Name of the folder every user gets on sign-up.
pub const ROOT_FOLDER: &str = ".root";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "folders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner: String,
    pub name: String,
    pub parent: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::folder_groups::Entity")]
    FolderGroups,
}

impl Related<super::folder_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FolderGroups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self, groups: Vec<String>) -> Record {
        record! {
            "_id" => self.id.clone(),
            "owner" => self.owner.clone(),
            "name" => self.name.clone(),
            "parent" => self.parent.clone().map_or(Value::Null, Value::from),
            "groups" => groups,
        }
    }
}
