//! Patterns matched against events and templates instantiated from frames.
//!
//! A [`Pattern`] is a partial description of an invocation: which operation,
//! which outcome tag, and per field a [`Term`]. Fields left out of a template
//! are unconstrained. An [`ActionTemplate`] is the `then` counterpart: an
//! operation plus per field an [`Arg`] filled in from a [`Frame`].

use crate::{Event, Frame, OperationName, Outcome, Record, ResultSync, Value, Variable};

/// Template field constraint.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    /// Field must be present; binds the variable or must agree with it.
    Var(Variable),
    /// Like [`Term::Var`], but an absent field binds the default instead.
    VarOr(Variable, Value),
    /// Field must be present and equal.
    Lit(Value),
    /// Field must be present, any value.
    Wildcard,
}

/// Template argument of a `then` action.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Var(Variable),
    Lit(Value),
    /// Nested record built from further arguments.
    Record(Vec<(String, Arg)>),
}

/// Literal value usable both as [`Term`] and [`Arg`].
#[derive(Clone, Debug, PartialEq)]
pub struct Literal(pub Value);

pub fn var(name: &str) -> Variable {
    Variable::from(name)
}

pub fn lit(value: impl Into<Value>) -> Literal {
    Literal(value.into())
}

pub fn any() -> Term {
    Term::Wildcard
}

pub fn var_or(name: &str, default: impl Into<Value>) -> Term {
    Term::VarOr(Variable::from(name), default.into())
}

impl From<Variable> for Term {
    fn from(value: Variable) -> Self {
        Self::Var(value)
    }
}

impl From<Literal> for Term {
    fn from(value: Literal) -> Self {
        Self::Lit(value.0)
    }
}

impl From<Variable> for Arg {
    fn from(value: Variable) -> Self {
        Self::Var(value)
    }
}

impl From<Literal> for Arg {
    fn from(value: Literal) -> Self {
        Self::Lit(value.0)
    }
}

impl Arg {
    /// Nested record argument, e.g. `group: { _id: group, name }`.
    pub fn record<I, K, A>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, A)>,
        K: Into<String>,
        A: Into<Arg>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(field, arg)| (field.into(), arg.into()))
                .collect(),
        )
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a Variable>) {
        match self {
            Self::Var(variable) => out.push(variable),
            Self::Lit(_) => {}
            Self::Record(fields) => {
                for (_, arg) in fields {
                    arg.collect_variables(out);
                }
            }
        }
    }

    fn instantiate(&self, frame: &Frame) -> ResultSync<Value> {
        match self {
            Self::Var(variable) => frame.require(variable.as_str()).cloned(),
            Self::Lit(value) => Ok(value.clone()),
            Self::Record(fields) => {
                let mut record = Record::new();
                for (field, arg) in fields {
                    record.insert(field.clone(), arg.instantiate(frame)?);
                }
                Ok(Value::Object(record))
            }
        }
    }
}

/// Expected outcome tag of a matched invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expect {
    Success,
    Error,
}

/// Partial specification of an invocation, used in `when`.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    pub operation: OperationName,
    pub inputs: Vec<(String, Term)>,
    pub expect: Expect,
    pub outputs: Vec<(String, Term)>,
}

impl Pattern {
    /// Pattern on a successful invocation of `operation`.
    pub fn on(operation: impl Into<OperationName>) -> Self {
        Self {
            operation: operation.into(),
            inputs: Vec::new(),
            expect: Expect::Success,
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, field: &str, term: impl Into<Term>) -> Self {
        self.inputs.push((field.to_string(), term.into()));
        self
    }

    /// Bind each input field to the variable of the same name.
    pub fn inputs(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self.inputs.push((field.to_string(), Term::Var(var(field))));
        }
        self
    }

    pub fn output(mut self, field: &str, term: impl Into<Term>) -> Self {
        self.outputs.push((field.to_string(), term.into()));
        self
    }

    /// Bind each output field to the variable of the same name.
    pub fn outputs(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self.outputs.push((field.to_string(), Term::Var(var(field))));
        }
        self
    }

    /// Match only error outcomes.
    pub fn failed(mut self) -> Self {
        self.expect = Expect::Error;
        self
    }

    /// Match only error outcomes, binding the message to `error`.
    pub fn error(self) -> Self {
        self.failed().outputs(&["error"])
    }

    /// Variables bound by this pattern.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .filter_map(|(_, term)| match term {
                Term::Var(variable) | Term::VarOr(variable, _) => Some(variable),
                Term::Lit(_) | Term::Wildcard => None,
            })
    }

    /// Unify `event` with this pattern under `frame`. Returns the extended
    /// frame on success.
    pub(crate) fn unify(&self, event: &Event, frame: &Frame) -> Option<Frame> {
        if event.operation != self.operation {
            return None;
        }
        let outputs = match (&event.outcome, self.expect) {
            (Outcome::Success(record), Expect::Success) => record,
            (Outcome::Error(record), Expect::Error) => record,
            _ => return None,
        };

        let mut frame = frame.clone();
        for (field, term) in &self.inputs {
            if !unify_field(term, event.inputs.get(field), &mut frame) {
                return None;
            }
        }
        for (field, term) in &self.outputs {
            if !unify_field(term, outputs.get(field), &mut frame) {
                return None;
            }
        }
        Some(frame)
    }
}

fn unify_field(term: &Term, value: Option<&Value>, frame: &mut Frame) -> bool {
    match (term, value) {
        (Term::Wildcard, value) => value.is_some(),
        (Term::Lit(literal), value) => value == Some(literal),
        (Term::Var(variable), Some(value)) => frame.unify(variable, value),
        (Term::Var(_), None) => false,
        (Term::VarOr(variable, default), value) => frame.unify(variable, value.unwrap_or(default)),
    }
}

/// One `then` action: operation plus argument templates.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionTemplate {
    pub operation: OperationName,
    pub args: Vec<(String, Arg)>,
}

impl ActionTemplate {
    pub fn call(operation: impl Into<OperationName>) -> Self {
        Self {
            operation: operation.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, field: &str, arg: impl Into<Arg>) -> Self {
        self.args.push((field.to_string(), arg.into()));
        self
    }

    /// Pass each variable as the field of the same name.
    pub fn args(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self.args.push((field.to_string(), Arg::Var(var(field))));
        }
        self
    }

    /// Variables the template reads.
    pub fn variables(&self) -> Vec<&Variable> {
        let mut out = Vec::new();
        for (_, arg) in &self.args {
            arg.collect_variables(&mut out);
        }
        out
    }

    /// Substitute the frame's bindings into the template.
    pub fn instantiate(&self, frame: &Frame) -> ResultSync<Record> {
        let mut record = Record::new();
        for (field, arg) in &self.args {
            record.insert(field.clone(), arg.instantiate(frame)?);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CausalId, EventId, SyncError, record};

    fn event(operation: &str, inputs: Record, outcome: Outcome) -> Event {
        Event {
            id: EventId(0),
            causal_id: CausalId::new(),
            operation: OperationName::from(operation),
            inputs,
            outcome,
        }
    }

    #[test]
    fn literal_and_variable_fields_unify() {
        let pattern = Pattern::on("Requesting.request")
            .input("path", lit("/Authentication/createUser"))
            .inputs(&["username"])
            .outputs(&["request"]);
        let event = event(
            "Requesting.request",
            record! { "path" => "/Authentication/createUser", "username" => "alice" },
            Outcome::success(record! { "request" => "r1" }),
        );

        let frame = pattern.unify(&event, &Frame::new()).unwrap();
        assert_eq!(frame.require_str("username"), Ok("alice"));
        assert_eq!(frame.require_str("request"), Ok("r1"));
    }

    #[test]
    fn literal_mismatch_rejects() {
        let pattern = Pattern::on("Requesting.request").input("path", lit("/Folder/createFolder"));
        let event = event(
            "Requesting.request",
            record! { "path" => "/Authentication/createUser" },
            Outcome::success(record! { "request" => "r1" }),
        );
        assert!(pattern.unify(&event, &Frame::new()).is_none());
    }

    #[test]
    fn success_pattern_ignores_error_outcome() {
        let success = Pattern::on("Authentication.createUser").outputs(&["user"]);
        let failure = Pattern::on("Authentication.createUser").error();
        let event = event(
            "Authentication.createUser",
            Record::new(),
            Outcome::error("Username already exists."),
        );

        assert!(success.unify(&event, &Frame::new()).is_none());
        let frame = failure.unify(&event, &Frame::new()).unwrap();
        assert_eq!(frame.require_str("error"), Ok("Username already exists."));
    }

    #[test]
    fn empty_success_pattern_still_requires_success_tag() {
        let pattern = Pattern::on("Debt.createDebt");
        let failed = event("Debt.createDebt", Record::new(), Outcome::error("exists"));
        let done = event("Debt.createDebt", Record::new(), Outcome::done());
        assert!(pattern.unify(&failed, &Frame::new()).is_none());
        assert!(pattern.unify(&done, &Frame::new()).is_some());
    }

    #[test]
    fn bound_variable_must_agree() {
        let pattern = Pattern::on("Authentication.validateToken").inputs(&["user"]);
        let event = event(
            "Authentication.validateToken",
            record! { "user" => "bob" },
            Outcome::success(record! { "user" => "bob" }),
        );
        let frame = Frame::new().with("user", "alice");
        assert!(pattern.unify(&event, &frame).is_none());
    }

    #[test]
    fn var_or_falls_back_to_default() {
        let pattern = Pattern::on("Requesting.request").input("folderName", var_or("folderName", ".root"));
        let event = event(
            "Requesting.request",
            Record::new(),
            Outcome::success(record! { "request" => "r1" }),
        );
        let frame = pattern.unify(&event, &Frame::new()).unwrap();
        assert_eq!(frame.require_str("folderName"), Ok(".root"));
    }

    #[test]
    fn wildcard_requires_presence() {
        let pattern = Pattern::on("Group.leaveGroup").input("group", any());
        let missing = event("Group.leaveGroup", Record::new(), Outcome::done());
        let present = event("Group.leaveGroup", record! { "group" => "g" }, Outcome::done());
        assert!(pattern.unify(&missing, &Frame::new()).is_none());
        assert!(pattern.unify(&present, &Frame::new()).is_some());
    }

    #[test]
    fn template_instantiates_nested_records() {
        let template = ActionTemplate::call("Requesting.respond")
            .args(&["request"])
            .arg(
                "group",
                Arg::record([("_id", Arg::from(var("group"))), ("name", Arg::from(lit("Trip")))]),
            );
        let frame = Frame::new().with("request", "r1").with("group", "g1");

        let record = template.instantiate(&frame).unwrap();
        assert_eq!(record.get("request"), Some(&Value::from("r1")));
        assert_eq!(
            record.get("group"),
            Some(&Value::Object(record! { "_id" => "g1", "name" => "Trip" }))
        );
        assert_eq!(template.variables().len(), 2);
    }

    #[test]
    fn template_with_unbound_variable_fails() {
        let template = ActionTemplate::call("Requesting.respond").args(&["request"]);
        assert_eq!(
            template.instantiate(&Frame::new()),
            Err(SyncError::Unbound("request".to_string()))
        );
    }
}
