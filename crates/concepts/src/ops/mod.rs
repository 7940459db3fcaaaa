//! Concept implementations.
//!
//! Every concept owns a [`DatabaseConnection`] and only touches its own
//! tables. The typed methods are the concept's Rust API; the
//! [`engine::Concept`] impls map loosely typed records onto them.

pub use authentication::Authentication;
pub use debt::Debt;
pub use expense::{DeletedExpense, EditedExpense, Expense, ExpenseChanges, NewExpense};
pub use folder::Folder;
pub use group::Group;

mod authentication;
mod debt;
mod expense;
mod folder;
mod group;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;
