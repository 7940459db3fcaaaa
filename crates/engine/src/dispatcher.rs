//! Chain drivers, frame pipelines and the public [`SyncEngine`] handle.
//!
//! Every causal chain is owned by one driver task. The driver matches each
//! newly recorded event against the rule base, spawns one task per fresh
//! match, and records the invocations those tasks report back. It stops once
//! its queue is empty and no task is in flight.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
    time::timeout,
};
use tracing::{debug, error, info, warn};

use crate::{
    Chain, CausalId, Concept, Event, EventId, Frame, OperationKind, OperationName, OperationSpec,
    Outcome, Queries, Record, Registry, Requesting, ResultSync, Rule, RuleId, RuleSet, SyncError,
    matcher, record, request_operation, respond_operation,
};

/// Time a request waits for its response unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What a finished chain looked like. Mostly useful to tests and tools.
#[derive(Clone, Debug)]
pub struct ChainReport {
    pub causal_id: CausalId,
    pub events: Vec<Event>,
    /// Payload of the chain's `Requesting.respond`, without `request`.
    pub response: Option<Record>,
}

impl ChainReport {
    /// Recorded invocations of `operation`, oldest first.
    pub fn invocations<'a>(&'a self, operation: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events
            .iter()
            .filter(move |event| event.operation.as_str() == operation)
    }

    /// Number of successful `Requesting.respond` invocations.
    pub fn responds(&self) -> usize {
        self.invocations("Requesting.respond")
            .filter(|event| event.outcome.is_success())
            .count()
    }
}

#[derive(Default)]
pub struct SyncEngineBuilder {
    concepts: Vec<Arc<dyn Concept>>,
    rules: Vec<Rule>,
    request_timeout: Option<Duration>,
}

impl SyncEngineBuilder {
    pub fn concept<C: Concept>(mut self, concept: C) -> Self {
        self.concepts.push(Arc::new(concept));
        self
    }

    pub fn shared_concept(mut self, concept: Arc<dyn Concept>) -> Self {
        self.concepts.push(concept);
        self
    }

    pub fn sync(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn syncs(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }

    /// Register the concepts, validate every rule and start the concept
    /// workers. Any declaration error rejects the whole engine.
    pub async fn build(self) -> ResultSync<SyncEngine> {
        let requesting = Arc::new(Requesting::new());
        let mut registry = Registry::default();
        registry.register(requesting.clone())?;
        for concept in self.concepts {
            registry.register(concept)?;
        }

        let rules = RuleSet::compile(self.rules, registry.catalog())?;
        info!(
            concepts = registry.catalog().len(),
            rules = rules.len(),
            "sync engine ready"
        );

        Ok(SyncEngine {
            inner: Arc::new(Inner {
                rules,
                registry: Arc::new(registry),
                requesting,
                request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            }),
        })
    }
}

#[derive(Debug)]
struct Inner {
    rules: RuleSet,
    registry: Arc<Registry>,
    requesting: Arc<Requesting>,
    request_timeout: Duration,
}

/// Cheap to clone handle on a running engine.
#[derive(Clone, Debug)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    /// Return a builder for `SyncEngine`.
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    /// Declared shape of `operation`.
    pub fn operation(&self, operation: &str) -> ResultSync<&OperationSpec> {
        self.inner.registry.spec(&OperationName::from(operation))
    }

    /// Start a chain with `Requesting.request` and wait for its response.
    ///
    /// Fails with [`SyncError::Timeout`] when no rule responds in time, and
    /// with [`SyncError::Unanswered`] when the chain quiesces without one.
    pub async fn request(&self, inputs: Record) -> ResultSync<Record> {
        let causal_id = CausalId::new();
        let response = self.inner.requesting.open(causal_id).await;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            drive(inner, causal_id, request_operation(), inputs, request_outcome(causal_id)).await;
        });

        match timeout(self.inner.request_timeout, response).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(SyncError::Unanswered),
            Err(_) => {
                self.inner.requesting.forget(causal_id).await;
                warn!(%causal_id, "request timed out");
                Err(SyncError::Timeout)
            }
        }
    }

    /// Like [`request`](Self::request), but waits for the chain to quiesce
    /// and returns its whole history.
    pub async fn run_request(&self, inputs: Record) -> ChainReport {
        let causal_id = CausalId::new();
        let mut response = self.inner.requesting.open(causal_id).await;
        let chain = drive(
            self.inner.clone(),
            causal_id,
            request_operation(),
            inputs,
            request_outcome(causal_id),
        )
        .await;

        ChainReport {
            causal_id,
            events: chain.into_events(),
            response: response.try_recv().ok(),
        }
    }

    /// Perform `operation` as the first event of a fresh chain and run the
    /// chain to quiescence.
    pub async fn invoke(&self, operation: &str, inputs: Record) -> ResultSync<ChainReport> {
        let operation = OperationName::from(operation);
        if self.inner.registry.spec(&operation)?.kind != OperationKind::Action {
            return Err(SyncError::NoSuchOperation(operation.to_string()));
        }
        if operation == request_operation() {
            return Ok(self.run_request(inputs).await);
        }

        let causal_id = CausalId::new();
        let outcome = self.inner.registry.perform(&operation, inputs.clone()).await;
        let chain = drive(self.inner.clone(), causal_id, operation, inputs, outcome).await;
        Ok(ChainReport {
            causal_id,
            events: chain.into_events(),
            response: None,
        })
    }

    /// Call an action directly, outside of any chain. No rule observes it.
    pub async fn perform(&self, operation: &str, inputs: Record) -> ResultSync<Outcome> {
        let operation = OperationName::from(operation);
        if self.inner.registry.spec(&operation)?.kind != OperationKind::Action {
            return Err(SyncError::NoSuchOperation(operation.to_string()));
        }
        Ok(self.inner.registry.perform(&operation, inputs).await)
    }

    /// Run a query directly.
    pub async fn query(&self, operation: &str, inputs: Record) -> ResultSync<Vec<Record>> {
        self.inner
            .registry
            .query(&OperationName::from(operation), inputs)
            .await
    }
}

fn request_outcome(causal_id: CausalId) -> Outcome {
    Outcome::success(record! { "request" => causal_id.to_value() })
}

enum Message {
    Record {
        operation: OperationName,
        inputs: Record,
        outcome: Outcome,
        ack: oneshot::Sender<EventId>,
    },
    ClaimRespond {
        ack: oneshot::Sender<bool>,
    },
}

/// Own one chain from its first event until quiescence.
async fn drive(
    inner: Arc<Inner>,
    causal_id: CausalId,
    operation: OperationName,
    inputs: Record,
    outcome: Outcome,
) -> Chain {
    let mut chain = Chain::new(causal_id);
    let first = chain.record(operation, inputs, outcome);
    let mut queue = VecDeque::from([first]);
    let mut tasks = JoinSet::new();
    let (sender, mut receiver) = mpsc::channel::<Message>(32);

    loop {
        while let Some(id) = queue.pop_front() {
            schedule(&inner, &mut chain, id, &mut tasks, &sender);
        }

        if tasks.is_empty() {
            match receiver.try_recv() {
                Ok(message) => {
                    handle(&mut chain, &mut queue, message);
                    continue;
                }
                Err(_) => break,
            }
        }

        tokio::select! {
            Some(message) = receiver.recv() => handle(&mut chain, &mut queue, message),
            Some(joined) = tasks.join_next() => {
                if let Err(err) = joined {
                    error!(%causal_id, "frame task failed: {err}");
                }
            }
            else => break,
        }
    }

    if inner.requesting.forget(causal_id).await {
        debug!(%causal_id, "chain quiesced without a response");
    }
    debug!(%causal_id, events = chain.events().len(), "chain quiesced");
    chain
}

/// Spawn a frame task for every fresh match completed by event `id`.
/// Returns the number of tasks spawned.
fn schedule(
    inner: &Arc<Inner>,
    chain: &mut Chain,
    id: EventId,
    tasks: &mut JoinSet<()>,
    sender: &mpsc::Sender<Message>,
) -> usize {
    let Some(event) = chain.event(id) else {
        return 0;
    };
    let causal_id = chain.causal_id();
    let mut spawned = 0;
    for found in matcher::matches(&inner.rules, chain, event) {
        if !chain.mark_fired(found.rule, found.events.clone()) {
            continue;
        }
        if let Some(rule) = inner.rules.get(found.rule) {
            debug!(%causal_id, rule = rule.name(), events = ?found.events, "firing");
        }
        tasks.spawn(run_frames(
            inner.clone(),
            causal_id,
            found.rule,
            found.frame,
            sender.clone(),
        ));
        spawned += 1;
    }
    spawned
}

fn handle(chain: &mut Chain, queue: &mut VecDeque<EventId>, message: Message) {
    match message {
        Message::Record {
            operation,
            inputs,
            outcome,
            ack,
        } => {
            let id = chain.record(operation, inputs, outcome);
            queue.push_back(id);
            let _ = ack.send(id);
        }
        Message::ClaimRespond { ack } => {
            let _ = ack.send(chain.claim_respond());
        }
    }
}

/// `where` then `then` for one match.
async fn run_frames(
    inner: Arc<Inner>,
    causal_id: CausalId,
    rule_id: RuleId,
    frame: Frame,
    driver: mpsc::Sender<Message>,
) {
    let Some(rule) = inner.rules.get(rule_id) else {
        return;
    };

    let frames = match rule.extension() {
        None => vec![frame],
        Some(extension) => {
            let queries = Queries::new(inner.registry.clone());
            match extension.apply(frame, queries).await {
                Ok(frames) => frames,
                Err(err) => {
                    warn!(%causal_id, rule = rule.name(), "where failed: {err}");
                    fail_chain(&inner, causal_id, &driver, err).await;
                    return;
                }
            }
        }
    };
    if frames.is_empty() {
        debug!(%causal_id, rule = rule.name(), "filtered out");
        return;
    }

    join_all(
        frames
            .into_iter()
            .map(|frame| dispatch(&inner, causal_id, rule, frame, &driver)),
    )
    .await;
}

/// Issue the rule's actions for one frame, in declared order.
async fn dispatch(
    inner: &Inner,
    causal_id: CausalId,
    rule: &Rule,
    frame: Frame,
    driver: &mpsc::Sender<Message>,
) {
    for action in rule.actions() {
        match action.instantiate(&frame) {
            Ok(inputs) => {
                invoke(inner, causal_id, driver, &action.operation, inputs).await;
            }
            Err(err) => {
                warn!(%causal_id, rule = rule.name(), "substitution failed: {err}");
                fail_chain(inner, causal_id, driver, err).await;
                return;
            }
        }
    }
}

/// Answer the chain's request with `err`.
async fn fail_chain(
    inner: &Inner,
    causal_id: CausalId,
    driver: &mpsc::Sender<Message>,
    err: SyncError,
) {
    let inputs = record! {
        "request" => causal_id.to_value(),
        "error" => err.to_string(),
    };
    invoke(inner, causal_id, driver, &respond_operation(), inputs).await;
}

/// Perform one action and wait until the driver has recorded it.
async fn invoke(
    inner: &Inner,
    causal_id: CausalId,
    driver: &mpsc::Sender<Message>,
    operation: &OperationName,
    inputs: Record,
) -> Option<EventId> {
    if *operation == respond_operation() {
        let (ack, claimed) = oneshot::channel();
        if driver.send(Message::ClaimRespond { ack }).await.is_err() {
            return None;
        }
        if !claimed.await.unwrap_or(false) {
            warn!(%causal_id, "chain already responded, dropping respond");
            return None;
        }
    }

    let outcome = inner.registry.perform(operation, inputs.clone()).await;
    if let Some(message) = outcome.error_message() {
        debug!(%causal_id, %operation, "action failed: {message}");
    }

    let (ack, recorded) = oneshot::channel();
    let message = Message::Record {
        operation: operation.clone(),
        inputs,
        outcome,
        ack,
    };
    driver.send(message).await.ok()?;
    recorded.await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActionTemplate, Pattern, lit};

    async fn ping_engine() -> SyncEngine {
        let rule = Rule::new("Ping")
            .when(
                Pattern::on("Requesting.request")
                    .input("path", lit("/ping"))
                    .outputs(&["request"]),
            )
            .then(
                ActionTemplate::call("Requesting.respond")
                    .args(&["request"])
                    .arg("pong", lit(true)),
            );
        SyncEngine::builder().sync(rule).build().await.unwrap()
    }

    #[tokio::test]
    async fn same_combination_is_scheduled_once() {
        let engine = ping_engine().await;
        let mut chain = Chain::new(CausalId::new());
        let id = chain.record(
            request_operation(),
            record! { "path" => "/ping" },
            request_outcome(chain.causal_id()),
        );
        let (sender, _receiver) = mpsc::channel(8);
        let mut tasks = JoinSet::new();

        assert_eq!(schedule(&engine.inner, &mut chain, id, &mut tasks, &sender), 1);
        assert_eq!(schedule(&engine.inner, &mut chain, id, &mut tasks, &sender), 0);
        tasks.abort_all();
    }

    #[tokio::test]
    async fn request_resolves_with_respond_payload() {
        let engine = ping_engine().await;
        let response = engine.request(record! { "path" => "/ping" }).await.unwrap();
        assert_eq!(response, record! { "pong" => true });
    }

    #[tokio::test]
    async fn unmatched_request_is_unanswered() {
        let engine = ping_engine().await;
        assert_eq!(
            engine.request(record! { "path" => "/nowhere" }).await,
            Err(SyncError::Unanswered)
        );
    }
}
