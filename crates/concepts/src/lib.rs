//! Storage-backed concepts of the ledger.
//!
//! Each concept owns its own tables and exposes narrow operations through
//! [`engine::Concept`]. Concepts never call each other: everything that spans
//! more than one of them is a rule in the `syncs` crate.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use error::ConceptError;
pub use folders::ROOT_FOLDER;
pub use ops::{
    Authentication, Debt, DeletedExpense, EditedExpense, Expense, ExpenseChanges, Folder, Group,
    NewExpense,
};

pub mod debts;
pub mod expenses;
pub mod folder_groups;
pub mod folders;
pub mod group_members;
pub mod groups;
pub mod user_splits;
pub mod users;

mod error;
mod ops;
mod util;

pub type ResultConcept<T> = Result<T, ConceptError>;

/// Every concept of the ledger, sharing one connection pool.
pub fn all(database: &DatabaseConnection) -> Vec<Arc<dyn engine::Concept>> {
    vec![
        Arc::new(Authentication::new(database.clone())),
        Arc::new(Folder::new(database.clone())),
        Arc::new(Group::new(database.clone())),
        Arc::new(Expense::new(database.clone())),
        Arc::new(Debt::new(database.clone())),
    ]
}
