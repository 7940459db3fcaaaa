//! Building blocks shared by every route.
//!
//! Most routes follow the same shape: the request asks
//! `Authentication.validateToken` for the acting user, a valid token triggers
//! one mutation, and the mutation's outcome is answered. [`Pipeline`] expands
//! that shape into its rules:
//!
//! | rule | when | then |
//! |---|---|---|
//! | `<Name>Request` | request | validateToken |
//! | `<Name>Unauthorized` | request, validateToken failed | respond error |
//! | `<Name>Validate` | request, validateToken | mutation |
//! | `<Name>Response` | request, validateToken, mutation ok | effects, respond |
//! | `<Name>ResponseError` | request, validateToken, mutation failed | respond error |

use engine::{
    ActionTemplate, OperationName, Pattern, Rule, Term, Value, lit, var, var_or,
};

pub(crate) const REQUEST: &str = "Requesting.request";
pub(crate) const RESPOND: &str = "Requesting.respond";
pub(crate) const VALIDATE_TOKEN: &str = "Authentication.validateToken";

/// The request event of `path`. Every listed field binds the variable of the
/// same name, or `null` when the caller left it out, so a missing field
/// reaches the concept and is reported instead of stalling the chain.
pub(crate) fn request(path: &str, fields: &[&str]) -> Pattern {
    let mut pattern = Pattern::on(REQUEST)
        .input("path", lit(path))
        .outputs(&["request"]);
    for field in fields {
        pattern = pattern.input(field, var_or(field, Value::Null));
    }
    pattern
}

/// `Requesting.respond { request }`.
pub(crate) fn respond() -> ActionTemplate {
    ActionTemplate::call(RESPOND).args(&["request"])
}

/// `Requesting.respond { request, error }`.
pub(crate) fn respond_error() -> ActionTemplate {
    respond().args(&["error"])
}

fn validate_token(actor: &str) -> ActionTemplate {
    ActionTemplate::call(VALIDATE_TOKEN)
        .arg("user", var(actor))
        .args(&["token"])
}

/// A successful `validateToken` for the acting user.
pub(crate) fn validated(actor: &str) -> Pattern {
    Pattern::on(VALIDATE_TOKEN)
        .input("user", var(actor))
        .inputs(&["token"])
        .output("user", var(actor))
}

/// Authenticated route wiring a request to one mutation.
#[derive(Debug)]
pub(crate) struct Pipeline {
    name: &'static str,
    request: Pattern,
    actor: &'static str,
    mutation: ActionTemplate,
    outputs: Vec<(String, Term)>,
    effects: Vec<ActionTemplate>,
    respond: ActionTemplate,
}

impl Pipeline {
    /// `request` must bind `token` and the `actor` variable.
    pub(crate) fn new(
        name: &'static str,
        request: Pattern,
        actor: &'static str,
        mutation: ActionTemplate,
    ) -> Self {
        Self {
            name,
            request,
            actor,
            mutation,
            outputs: Vec::new(),
            effects: Vec::new(),
            respond: respond(),
        }
    }

    /// Mutation outputs bound for the response.
    pub(crate) fn outputs(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self.outputs.push((field.to_string(), var(field).into()));
        }
        self
    }

    /// Mutation output bound under another name, for outputs whose field
    /// clashes with a request field.
    pub(crate) fn output(mut self, field: &str, term: impl Into<Term>) -> Self {
        self.outputs.push((field.to_string(), term.into()));
        self
    }

    /// Extra action issued on success, before the respond.
    pub(crate) fn effect(mut self, action: ActionTemplate) -> Self {
        self.effects.push(action);
        self
    }

    pub(crate) fn respond(mut self, respond: ActionTemplate) -> Self {
        self.respond = respond;
        self
    }

    /// Additional rule `<Name><suffix>` on the request and a valid token.
    pub(crate) fn follow_up(&self, suffix: &str) -> Rule {
        Rule::new(self.rule_name(suffix))
            .when(self.request.clone())
            .when(validated(self.actor))
    }

    /// Pattern on the successful mutation with its declared outputs.
    pub(crate) fn succeeded(&self) -> Pattern {
        let mut pattern = Pattern::on(self.mutation_name());
        pattern.outputs = self.outputs.clone();
        pattern
    }

    fn mutation_name(&self) -> OperationName {
        self.mutation.operation.clone()
    }

    fn rule_name(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.name)
    }

    pub(crate) fn rules(self) -> Vec<Rule> {
        let mut response = Rule::new(self.rule_name("Response"))
            .when(self.request.clone())
            .when(validated(self.actor))
            .when(self.succeeded());
        for effect in &self.effects {
            response = response.then(effect.clone());
        }
        let response = response.then(self.respond.clone());

        let validate = Rule::new(self.rule_name("Validate"))
            .when(self.request.clone())
            .when(validated(self.actor))
            .then(self.mutation.clone());

        vec![
            Rule::new(self.rule_name("Request"))
                .when(self.request.clone())
                .then(validate_token(self.actor)),
            Rule::new(self.rule_name("Unauthorized"))
                .when(self.request.clone())
                .when(
                    Pattern::on(VALIDATE_TOKEN)
                        .input("user", var(self.actor))
                        .inputs(&["token"])
                        .error(),
                )
                .then(respond_error()),
            validate,
            response,
            Rule::new(self.rule_name("ResponseError"))
                .when(self.request.clone())
                .when(validated(self.actor))
                .when(Pattern::on(self.mutation_name()).error())
                .then(respond_error()),
        ]
    }
}
