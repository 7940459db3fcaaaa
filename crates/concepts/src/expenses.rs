//! Expenses table. Amounts are minor units.

use engine::{Record, Value, record};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub total_cost: i64,
    pub date: DateTimeUtc,
    pub group_id: String,
    pub payer: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_splits::Entity")]
    UserSplits,
}

impl Related<super::user_splits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserSplits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> Record {
        record! {
            "_id" => self.id.clone(),
            "title" => self.title.clone(),
            "description" => self.description.clone().map_or(Value::Null, Value::from),
            "category" => self.category.clone(),
            "totalCost" => self.total_cost,
            "date" => self.date.to_rfc3339(),
            "group" => self.group_id.clone(),
            "payer" => self.payer.clone(),
        }
    }
}
