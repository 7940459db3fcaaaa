//! The module contains the errors the sync engine can return.
//!
//! Declaration errors ([`UnknownOperation`], [`UnknownField`],
//! [`UnboundVariable`], ...) are raised while building the engine and abort
//! startup. Runtime errors ([`Query`], [`Timeout`], ...) are scoped to one
//! causal chain.
//!
//!  [`UnknownOperation`]: SyncError::UnknownOperation
//!  [`UnknownField`]: SyncError::UnknownField
//!  [`UnboundVariable`]: SyncError::UnboundVariable
//!  [`Query`]: SyncError::Query
//!  [`Timeout`]: SyncError::Timeout
use thiserror::Error;

use crate::Outcome;

/// Failure reported by a concept read query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct QueryError(pub String);

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Sync engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("rule \"{0}\" declared twice")]
    DuplicateRule(String),
    #[error("rule \"{0}\" has an empty when clause")]
    EmptyWhen(String),
    #[error("rule \"{rule}\" references unknown operation {operation}")]
    UnknownOperation { rule: String, operation: String },
    #[error("rule \"{rule}\": {operation} has no field \"{field}\"")]
    UnknownField {
        rule: String,
        operation: String,
        field: String,
    },
    #[error("rule \"{rule}\" uses unbound variable \"{variable}\"")]
    UnboundVariable { rule: String, variable: String },
    #[error("rule \"{rule}\" dispatches {operation}, which is not an action")]
    NotAnAction { rule: String, operation: String },
    #[error("concept \"{0}\" is not registered")]
    UnknownConcept(String),
    #[error("concept \"{0}\" registered twice")]
    DuplicateConcept(String),
    #[error("concept \"{concept}\" declares foreign operation {operation}")]
    ForeignOperation { concept: String, operation: String },
    #[error("\"{0}\" operation not found!")]
    NoSuchOperation(String),
    #[error("{0} is not a query")]
    NotAQuery(String),
    #[error("variable \"{0}\" is not bound")]
    Unbound(String),
    #[error("where step rebound variable \"{0}\"")]
    Rebound(String),
    #[error("variable \"{variable}\" has the wrong type: expected {expected}")]
    WrongType { variable: String, expected: &'static str },
    #[error("query {operation} failed: {source}")]
    Query {
        operation: String,
        #[source]
        source: QueryError,
    },
    #[error("concept \"{0}\" is unavailable")]
    Unavailable(String),
    #[error("request timed out")]
    Timeout,
    #[error("request finished without a response")]
    Unanswered,
}

impl From<SyncError> for Outcome {
    fn from(value: SyncError) -> Self {
        Outcome::error(value.to_string())
    }
}
