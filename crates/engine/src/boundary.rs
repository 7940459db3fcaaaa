//! The `Requesting` concept: where external requests enter a causal chain and
//! where their single response leaves it.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use crate::{CausalId, Concept, OperationName, OperationSpec, Outcome, Record, Value, record};

pub const REQUESTING: &str = "Requesting";

/// `Requesting.request`
pub fn request_operation() -> OperationName {
    OperationName::new(REQUESTING, "request")
}

/// `Requesting.respond`
pub fn respond_operation() -> OperationName {
    OperationName::new(REQUESTING, "respond")
}

/// Pending requests, keyed by the chain's causal id.
#[derive(Debug, Default)]
pub struct Requesting {
    pending: Mutex<HashMap<String, oneshot::Sender<Record>>>,
}

impl Requesting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request; the receiver resolves with the respond
    /// payload.
    pub async fn open(&self, causal_id: CausalId) -> oneshot::Receiver<Record> {
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(causal_id.to_string(), sender);
        receiver
    }

    /// Drop a pending request. Returns `true` when it was still pending.
    pub async fn forget(&self, causal_id: CausalId) -> bool {
        self.pending
            .lock()
            .await
            .remove(&causal_id.to_string())
            .is_some()
    }

    async fn respond(&self, mut inputs: Record) -> Outcome {
        let Some(Value::String(request)) = inputs.remove("request") else {
            return Outcome::error("respond requires a request id");
        };
        let Some(sender) = self.pending.lock().await.remove(&request) else {
            warn!(request, "respond without a pending request");
            return Outcome::error(format!("no pending request {request}"));
        };
        if sender.send(inputs).is_err() {
            debug!(request, "requester went away before the response");
        }
        Outcome::success(record! { "request" => request })
    }
}

#[async_trait]
impl Concept for Requesting {
    fn name(&self) -> &'static str {
        REQUESTING
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::action(REQUESTING, "request")
                .open_inputs()
                .success(&["request"]),
            OperationSpec::action(REQUESTING, "respond")
                .open_inputs()
                .success(&["request"]),
        ]
    }

    async fn perform(&self, action: &str, inputs: Record) -> Outcome {
        match action {
            "respond" => self.respond(inputs).await,
            "request" => Outcome::error("requests are opened by the engine"),
            other => Outcome::error(format!("\"Requesting.{other}\" operation not found!")),
        }
    }
}
