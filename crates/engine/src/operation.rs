//! Operation identities and invocation events.
//!
//! Every concept capability is identified by an [`OperationName`] of the form
//! `Concept.operation` and described once by an [`OperationSpec`]. Each call
//! of an operation inside a causal chain is recorded as an [`Event`].

use std::{collections::BTreeSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Concrete value carried by records and frames.
pub type Value = serde_json::Value;

/// Named fields of an operation input or outcome.
pub type Record = serde_json::Map<String, Value>;

/// Build a [`Record`] from `key => value` pairs.
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(
            record.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        record
    }};
}

/// `Concept.operation`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationName(Arc<str>);

impl OperationName {
    pub fn new(concept: &str, operation: &str) -> Self {
        Self(Arc::from(format!("{concept}.{operation}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The owning concept, i.e. the part before the first dot.
    pub fn concept(&self) -> &str {
        let name: &str = &self.0;
        name.split_once('.').map_or(name, |(concept, _)| concept)
    }

    /// The operation inside its concept.
    pub fn operation(&self) -> &str {
        self.0.split_once('.').map_or("", |(_, operation)| operation)
    }
}

impl From<&str> for OperationName {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for OperationName {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// May mutate concept state; dispatched by rules.
    Action,
    /// Read-only; used by `where` extensions and passthrough routes.
    Query,
}

/// Field schema of one side of an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fields {
    Closed(BTreeSet<String>),
    /// Any field name is accepted (request parameters, respond payloads).
    Open,
}

impl Fields {
    pub fn closed(fields: &[&str]) -> Self {
        Self::Closed(fields.iter().map(|field| field.to_string()).collect())
    }

    pub fn contains(&self, field: &str) -> bool {
        match self {
            Self::Closed(fields) => fields.contains(field),
            Self::Open => true,
        }
    }
}

/// Declared shape of an operation. Immutable for the process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: OperationName,
    pub kind: OperationKind,
    pub inputs: Fields,
    pub success: Fields,
    pub error: Fields,
}

impl OperationSpec {
    pub fn action(concept: &str, operation: &str) -> Self {
        Self::new(concept, operation, OperationKind::Action)
    }

    pub fn query(concept: &str, operation: &str) -> Self {
        Self::new(concept, operation, OperationKind::Query)
    }

    fn new(concept: &str, operation: &str, kind: OperationKind) -> Self {
        Self {
            name: OperationName::new(concept, operation),
            kind,
            inputs: Fields::closed(&[]),
            success: Fields::closed(&[]),
            error: Fields::closed(&["error"]),
        }
    }

    pub fn inputs(mut self, fields: &[&str]) -> Self {
        self.inputs = Fields::closed(fields);
        self
    }

    pub fn open_inputs(mut self) -> Self {
        self.inputs = Fields::Open;
        self
    }

    pub fn success(mut self, fields: &[&str]) -> Self {
        self.success = Fields::closed(fields);
        self
    }

    pub fn open_success(mut self) -> Self {
        self.success = Fields::Open;
        self
    }
}

/// Tagged result of an operation invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum Outcome {
    Success(Record),
    Error(Record),
}

impl Outcome {
    pub fn success(record: Record) -> Self {
        Self::Success(record)
    }

    /// Success without output fields.
    pub fn done() -> Self {
        Self::Success(Record::new())
    }

    /// Error record carrying the mandatory `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        let mut record = Record::new();
        record.insert("error".to_string(), Value::String(message.into()));
        Self::Error(record)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn record(&self) -> &Record {
        match self {
            Self::Success(record) | Self::Error(record) => record,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Self::Success(record) | Self::Error(record) => record,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Error(record) => record.get("error").and_then(Value::as_str),
        }
    }
}

/// Position of an event inside its chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

/// Identifier of one causal chain, bound to the `request` variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CausalId(Uuid);

impl CausalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn to_value(self) -> Value {
        Value::String(self.0.to_string())
    }
}

impl Default for CausalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CausalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One completed invocation inside a causal chain.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub causal_id: CausalId,
    pub operation: OperationName,
    pub inputs: Record,
    pub outcome: Outcome,
}
