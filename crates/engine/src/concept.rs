//! Concept contract and the worker tasks that serialize each concept's calls.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::{
    OperationKind, OperationName, OperationSpec, Outcome, QueryError, Record, ResultSync,
    SyncError,
};

/// Pending calls a concept worker buffers before callers wait.
const MAILBOX: usize = 64;

/// Independent, storage-backed module exposing actions and queries.
///
/// A concept never calls another concept: cross-concept behavior lives in
/// rules.
#[async_trait]
pub trait Concept: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Every operation the concept serves. Names must belong to the concept.
    fn operations(&self) -> Vec<OperationSpec>;

    /// Run an action. Domain failures are reported as [`Outcome::Error`].
    async fn perform(&self, action: &str, inputs: Record) -> Outcome;

    /// Run a read-only query.
    async fn query(&self, query: &str, _inputs: Record) -> Result<Vec<Record>, QueryError> {
        Err(QueryError::new(format!("{}.{query} is not a query", self.name())))
    }
}

enum Call {
    Perform {
        action: String,
        inputs: Record,
        reply: oneshot::Sender<Outcome>,
    },
    Query {
        query: String,
        inputs: Record,
        reply: oneshot::Sender<Result<Vec<Record>, QueryError>>,
    },
}

/// Mailbox of a running concept worker.
#[derive(Clone, Debug)]
pub struct ConceptHandle {
    name: &'static str,
    sender: mpsc::Sender<Call>,
}

impl ConceptHandle {
    /// Spawn the worker task owning `concept`.
    pub fn spawn(concept: Arc<dyn Concept>) -> Self {
        let name = concept.name();
        let (sender, mut receiver) = mpsc::channel::<Call>(MAILBOX);

        tokio::spawn(async move {
            while let Some(call) = receiver.recv().await {
                match call {
                    Call::Perform {
                        action,
                        inputs,
                        reply,
                    } => {
                        let outcome = concept.perform(&action, inputs).await;
                        debug!(concept = name, action, success = outcome.is_success(), "performed");
                        let _ = reply.send(outcome);
                    }
                    Call::Query {
                        query,
                        inputs,
                        reply,
                    } => {
                        let _ = reply.send(concept.query(&query, inputs).await);
                    }
                }
            }
            debug!(concept = name, "worker stopped");
        });

        Self { name, sender }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn perform(&self, action: &str, inputs: Record) -> Outcome {
        let (reply, response) = oneshot::channel();
        let call = Call::Perform {
            action: action.to_string(),
            inputs,
            reply,
        };
        if self.sender.send(call).await.is_err() {
            error!(concept = self.name, "worker is gone");
            return SyncError::Unavailable(self.name.to_string()).into();
        }
        response
            .await
            .unwrap_or_else(|_| SyncError::Unavailable(self.name.to_string()).into())
    }

    pub async fn query(&self, query: &str, inputs: Record) -> Result<Vec<Record>, QueryError> {
        let unavailable = || QueryError::new(SyncError::Unavailable(self.name.to_string()).to_string());
        let (reply, response) = oneshot::channel();
        let call = Call::Query {
            query: query.to_string(),
            inputs,
            reply,
        };
        self.sender.send(call).await.map_err(|_| unavailable())?;
        response.await.map_err(|_| unavailable())?
    }
}

/// Every registered concept and the operation catalog built from them.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    catalog: HashMap<OperationName, OperationSpec>,
    concepts: HashMap<&'static str, ConceptHandle>,
}

impl Registry {
    pub(crate) fn register(&mut self, concept: Arc<dyn Concept>) -> ResultSync<()> {
        let name = concept.name();
        if self.concepts.contains_key(name) {
            return Err(SyncError::DuplicateConcept(name.to_string()));
        }
        let operations = concept.operations();
        if let Some(foreign) = operations.iter().find(|spec| spec.name.concept() != name) {
            return Err(SyncError::ForeignOperation {
                concept: name.to_string(),
                operation: foreign.name.to_string(),
            });
        }
        self.catalog
            .extend(operations.into_iter().map(|spec| (spec.name.clone(), spec)));
        self.concepts.insert(name, ConceptHandle::spawn(concept));
        Ok(())
    }

    pub(crate) fn catalog(&self) -> &HashMap<OperationName, OperationSpec> {
        &self.catalog
    }

    pub(crate) fn spec(&self, operation: &OperationName) -> ResultSync<&OperationSpec> {
        if !self.concepts.contains_key(operation.concept()) {
            return Err(SyncError::UnknownConcept(operation.concept().to_string()));
        }
        self.catalog
            .get(operation)
            .ok_or_else(|| SyncError::NoSuchOperation(operation.to_string()))
    }

    fn handle(&self, operation: &OperationName) -> ResultSync<&ConceptHandle> {
        self.concepts
            .get(operation.concept())
            .ok_or_else(|| SyncError::UnknownConcept(operation.concept().to_string()))
    }

    pub(crate) async fn perform(&self, operation: &OperationName, inputs: Record) -> Outcome {
        match self.handle(operation) {
            Ok(handle) => handle.perform(operation.operation(), inputs).await,
            Err(err) => err.into(),
        }
    }

    pub(crate) async fn query(
        &self,
        operation: &OperationName,
        inputs: Record,
    ) -> ResultSync<Vec<Record>> {
        if self.spec(operation)?.kind != OperationKind::Query {
            return Err(SyncError::NotAQuery(operation.to_string()));
        }
        self.handle(operation)?
            .query(operation.operation(), inputs)
            .await
            .map_err(|source| SyncError::Query {
                operation: operation.to_string(),
                source,
            })
    }
}

/// Read-only access to concept queries, handed to `where` extensions.
#[derive(Clone, Debug)]
pub struct Queries {
    registry: Arc<Registry>,
}

impl Queries {
    pub(crate) fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Run a query operation, e.g. `Expense._getExpenseById`.
    pub async fn query(&self, operation: &str, inputs: Record) -> ResultSync<Vec<Record>> {
        self.registry
            .query(&OperationName::from(operation), inputs)
            .await
    }

    /// First row of a query, if any.
    pub async fn first(&self, operation: &str, inputs: Record) -> ResultSync<Option<Record>> {
        Ok(self.query(operation, inputs).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    struct Counter;

    #[async_trait]
    impl Concept for Counter {
        fn name(&self) -> &'static str {
            "Counter"
        }

        fn operations(&self) -> Vec<OperationSpec> {
            vec![
                OperationSpec::action("Counter", "bump").inputs(&["n"]).success(&["n"]),
                OperationSpec::query("Counter", "_peek").success(&["n"]),
            ]
        }

        async fn perform(&self, action: &str, inputs: Record) -> Outcome {
            match (action, inputs.get("n").and_then(|n| n.as_i64())) {
                ("bump", Some(n)) => Outcome::success(record! { "n" => n + 1 }),
                _ => Outcome::error("bad call"),
            }
        }

        async fn query(&self, _query: &str, _inputs: Record) -> Result<Vec<Record>, QueryError> {
            Ok(vec![record! { "n" => 0 }])
        }
    }

    struct Stranger;

    #[async_trait]
    impl Concept for Stranger {
        fn name(&self) -> &'static str {
            "Stranger"
        }

        fn operations(&self) -> Vec<OperationSpec> {
            vec![OperationSpec::action("Counter", "bump")]
        }

        async fn perform(&self, _action: &str, _inputs: Record) -> Outcome {
            Outcome::done()
        }
    }

    #[tokio::test]
    async fn worker_serves_actions_and_queries() {
        let mut registry = Registry::default();
        registry.register(Arc::new(Counter)).unwrap();
        let registry = Arc::new(registry);

        let outcome = registry
            .perform(&"Counter.bump".into(), record! { "n" => 1 })
            .await;
        assert_eq!(outcome, Outcome::success(record! { "n" => 2 }));

        let queries = Queries::new(registry.clone());
        let row = queries.first("Counter._peek", Record::new()).await.unwrap();
        assert_eq!(row, Some(record! { "n" => 0 }));

        assert_eq!(
            queries.query("Counter.bump", Record::new()).await,
            Err(SyncError::NotAQuery("Counter.bump".to_string()))
        );
        assert_eq!(
            queries.query("Nobody._x", Record::new()).await,
            Err(SyncError::UnknownConcept("Nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn registration_rejects_duplicates_and_foreign_operations() {
        let mut registry = Registry::default();
        registry.register(Arc::new(Counter)).unwrap();
        assert_eq!(
            registry.register(Arc::new(Counter)).unwrap_err(),
            SyncError::DuplicateConcept("Counter".to_string())
        );
        assert!(matches!(
            registry.register(Arc::new(Stranger)).unwrap_err(),
            SyncError::ForeignOperation { .. }
        ));
    }
}
