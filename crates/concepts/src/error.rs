//! The module contains the error the concepts can throw.
//!
//! Every variant except [`Database`] is a domain failure: the message is
//! returned to the caller as the `error` field of the operation outcome.
//!
//!  [`Database`]: ConceptError::Database
use sea_orm::DbErr;
use thiserror::Error;

use engine::Outcome;

/// Concept custom errors.
#[derive(Error, Debug)]
pub enum ConceptError {
    #[error("{0} is required.")]
    MissingField(String),
    #[error("{field} must be {expected}.")]
    WrongType {
        field: String,
        expected: &'static str,
    },
    #[error("{0} not found.")]
    KeyNotFound(String),
    #[error("{0} already exists.")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("User not authenticated. Please log in.")]
    Unauthenticated,
    #[error("{0}")]
    Rejected(String),
    #[error("\"{0}\" operation not found!")]
    UnknownOperation(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for ConceptError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::MissingField(a), Self::MissingField(b)) => a == b,
            (
                Self::WrongType {
                    field: a,
                    expected: x,
                },
                Self::WrongType {
                    field: b,
                    expected: y,
                },
            ) => a == b && x == y,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::Unauthenticated, Self::Unauthenticated) => true,
            (Self::Rejected(a), Self::Rejected(b)) => a == b,
            (Self::UnknownOperation(a), Self::UnknownOperation(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl From<ConceptError> for Outcome {
    fn from(value: ConceptError) -> Self {
        if let ConceptError::Database(err) = &value {
            tracing::error!("database failure: {err}");
        }
        Outcome::error(value.to_string())
    }
}
