//! Rule ("sync") declarations and their load-time validation.
//!
//! A [`Rule`] is a `when`/`where`/`then` triple. Rules are compiled once into
//! a [`RuleSet`] when the engine is built; a single invalid rule aborts the
//! whole build.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    future::Future,
    sync::Arc,
};

use futures::future::BoxFuture;

use crate::{
    ActionTemplate, Expect, Frame, OperationKind, OperationName, OperationSpec, Pattern, Queries,
    ResultSync, SyncError, Variable,
};

type ExtensionFn = dyn Fn(Frame, Queries) -> BoxFuture<'static, ResultSync<Vec<Frame>>> + Send + Sync;

/// Read-only `where` step: maps one frame to zero, one or many frames.
#[derive(Clone)]
pub struct Extension {
    uses: Vec<Variable>,
    binds: Vec<Variable>,
    run: Arc<ExtensionFn>,
}

impl Extension {
    /// `uses` are the frame variables the step reads, `binds` the variables
    /// every returned frame must carry in addition.
    pub fn new<F, Fut>(uses: &[&str], binds: &[&str], run: F) -> Self
    where
        F: Fn(Frame, Queries) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResultSync<Vec<Frame>>> + Send + 'static,
    {
        Self {
            uses: uses.iter().map(|name| Variable::from(*name)).collect(),
            binds: binds.iter().map(|name| Variable::from(*name)).collect(),
            run: Arc::new(move |frame, queries| Box::pin(run(frame, queries))),
        }
    }

    pub fn uses(&self) -> &[Variable] {
        &self.uses
    }

    pub fn binds(&self) -> &[Variable] {
        &self.binds
    }

    /// Run the step for one frame and check every returned frame extends it
    /// with the declared bindings.
    pub(crate) async fn apply(&self, frame: Frame, queries: Queries) -> ResultSync<Vec<Frame>> {
        let frames = (self.run)(frame.clone(), queries).await?;
        for extended in &frames {
            if let Some(rebound) = frame.conflict(extended) {
                return Err(SyncError::Rebound(rebound.to_string()));
            }
        }
        for frame in &frames {
            if let Some(missing) = self.binds.iter().find(|name| !frame.contains(name.as_str())) {
                return Err(SyncError::Unbound(missing.to_string()));
            }
        }
        Ok(frames)
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("uses", &self.uses)
            .field("binds", &self.binds)
            .finish_non_exhaustive()
    }
}

/// Declarative wiring between concept operations.
#[derive(Clone, Debug)]
pub struct Rule {
    name: String,
    when: Vec<Pattern>,
    extension: Option<Extension>,
    then: Vec<ActionTemplate>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            when: Vec::new(),
            extension: None,
            then: Vec::new(),
        }
    }

    pub fn when(mut self, pattern: Pattern) -> Self {
        self.when.push(pattern);
        self
    }

    pub fn where_with(mut self, extension: Extension) -> Self {
        self.extension = Some(extension);
        self
    }

    pub fn then(mut self, action: ActionTemplate) -> Self {
        self.then.push(action);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.when
    }

    pub fn extension(&self) -> Option<&Extension> {
        self.extension.as_ref()
    }

    pub fn actions(&self) -> &[ActionTemplate] {
        &self.then
    }

    fn validate(&self, catalog: &HashMap<OperationName, OperationSpec>) -> ResultSync<()> {
        if self.when.is_empty() {
            return Err(SyncError::EmptyWhen(self.name.clone()));
        }

        let mut bound: BTreeSet<&str> = BTreeSet::new();
        for pattern in &self.when {
            let spec = self.lookup(catalog, &pattern.operation)?;
            for (field, _) in &pattern.inputs {
                self.check_field(spec, &spec.inputs, field)?;
            }
            let outputs = match pattern.expect {
                Expect::Success => &spec.success,
                Expect::Error => &spec.error,
            };
            for (field, _) in &pattern.outputs {
                self.check_field(spec, outputs, field)?;
            }
            bound.extend(pattern.variables().map(Variable::as_str));
        }

        if let Some(extension) = &self.extension {
            for used in extension.uses() {
                self.check_bound(&bound, used)?;
            }
            bound.extend(extension.binds().iter().map(Variable::as_str));
        }

        for action in &self.then {
            let spec = self.lookup(catalog, &action.operation)?;
            if spec.kind != OperationKind::Action {
                return Err(SyncError::NotAnAction {
                    rule: self.name.clone(),
                    operation: action.operation.to_string(),
                });
            }
            for (field, _) in &action.args {
                self.check_field(spec, &spec.inputs, field)?;
            }
            for variable in action.variables() {
                self.check_bound(&bound, variable)?;
            }
        }
        Ok(())
    }

    fn lookup<'a>(
        &self,
        catalog: &'a HashMap<OperationName, OperationSpec>,
        operation: &OperationName,
    ) -> ResultSync<&'a OperationSpec> {
        catalog
            .get(operation)
            .ok_or_else(|| SyncError::UnknownOperation {
                rule: self.name.clone(),
                operation: operation.to_string(),
            })
    }

    fn check_field(
        &self,
        spec: &OperationSpec,
        fields: &crate::Fields,
        field: &str,
    ) -> ResultSync<()> {
        if fields.contains(field) {
            return Ok(());
        }
        Err(SyncError::UnknownField {
            rule: self.name.clone(),
            operation: spec.name.to_string(),
            field: field.to_string(),
        })
    }

    fn check_bound(&self, bound: &BTreeSet<&str>, variable: &Variable) -> ResultSync<()> {
        if bound.contains(variable.as_str()) {
            return Ok(());
        }
        Err(SyncError::UnboundVariable {
            rule: self.name.clone(),
            variable: variable.to_string(),
        })
    }
}

/// Index of a rule inside its [`RuleSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub usize);

/// Validated, immutable rule base with an index from operation to the
/// `(rule, position)` pairs whose pattern watches it.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    watchers: HashMap<OperationName, Vec<(RuleId, usize)>>,
}

impl RuleSet {
    /// Validate every rule; any failure rejects the whole set.
    pub fn compile(
        rules: Vec<Rule>,
        catalog: &HashMap<OperationName, OperationSpec>,
    ) -> ResultSync<Self> {
        let mut names = HashSet::new();
        for rule in &rules {
            if !names.insert(rule.name()) {
                return Err(SyncError::DuplicateRule(rule.name().to_string()));
            }
            rule.validate(catalog)?;
        }

        let mut watchers: HashMap<OperationName, Vec<(RuleId, usize)>> = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            for (position, pattern) in rule.when.iter().enumerate() {
                watchers
                    .entry(pattern.operation.clone())
                    .or_default()
                    .push((RuleId(index), position));
            }
        }
        Ok(Self { rules, watchers })
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule positions that may be satisfied by an invocation of `operation`.
    pub(crate) fn watching(&self, operation: &OperationName) -> &[(RuleId, usize)] {
        self.watchers
            .get(operation)
            .map_or(&[], Vec::as_slice)
    }
}
