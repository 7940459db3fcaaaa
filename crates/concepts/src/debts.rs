//! Debts table.
//!
//! One row per unordered pair of users, stored with `user_a < user_b`.
//! A positive `balance` means `user_b` owes `user_a`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "debts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub balance: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Balance seen from `user`: positive when the other side owes `user`.
    pub fn balance_for(&self, user: &str) -> i64 {
        if user == self.user_a {
            self.balance
        } else {
            -self.balance
        }
    }

    pub fn counterparty(&self, user: &str) -> &str {
        if user == self.user_a {
            &self.user_b
        } else {
            &self.user_a
        }
    }
}
