//! Binding environments produced while matching a rule.

use std::{
    borrow::Borrow,
    collections::{BTreeMap, btree_map},
    fmt,
    sync::Arc,
};

use crate::{ResultSync, SyncError, Value};

/// Name of a pattern variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(Arc<str>);

impl Variable {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl Borrow<str> for Variable {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One consistent way of satisfying a rule: variable name to concrete value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame(BTreeMap<Variable, Value>);

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub(crate) fn iter(&self) -> btree_map::Iter<'_, Variable, Value> {
        self.0.iter()
    }

    /// First variable of `self` that `other` binds to a different value.
    pub(crate) fn conflict(&self, other: &Frame) -> Option<&Variable> {
        self.iter()
            .find(|(name, value)| other.get(name.as_str()).is_some_and(|bound| bound != *value))
            .map(|(name, _)| name)
    }

    /// Bound value, or [`SyncError::Unbound`].
    pub fn require(&self, name: &str) -> ResultSync<&Value> {
        self.get(name)
            .ok_or_else(|| SyncError::Unbound(name.to_string()))
    }

    pub fn require_str(&self, name: &str) -> ResultSync<&str> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| SyncError::WrongType {
                variable: name.to_string(),
                expected: "string",
            })
    }

    pub fn require_i64(&self, name: &str) -> ResultSync<i64> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| SyncError::WrongType {
                variable: name.to_string(),
                expected: "integer",
            })
    }

    /// Set (or overwrite) a binding.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(Variable::from(name), value.into());
    }

    /// Copy of this frame extended with one more binding.
    pub fn with(&self, name: &str, value: impl Into<Value>) -> Self {
        let mut frame = self.clone();
        frame.bind(name, value);
        frame
    }

    /// Bind `variable` to `value`, or check agreement when already bound.
    pub(crate) fn unify(&mut self, variable: &Variable, value: &Value) -> bool {
        match self.0.get(variable) {
            Some(bound) => bound == value,
            None => {
                self.0.insert(variable.clone(), value.clone());
                true
            }
        }
    }
}
