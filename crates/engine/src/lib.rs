//! Declarative synchronization engine.
//!
//! Concepts are independent modules exposing actions and queries. Rules
//! ("syncs") wire them together: when a set of invocations has happened
//! inside one causal chain (`when`), optionally read more state (`where`),
//! then invoke further actions (`then`).
//!
//! ```ignore
//! let engine = SyncEngine::builder()
//!     .concept(Authentication::new(db.clone()))
//!     .syncs(syncs::all())
//!     .build()
//!     .await?;
//! let response = engine.request(record! { "path" => "/Authentication/createUser", ... }).await?;
//! ```
//!
//! Every chain is isolated: matching only joins events that share the
//! chain's causal id, a rule fires at most once per combination of events,
//! and a request is answered at most once.

pub use boundary::{REQUESTING, Requesting, request_operation, respond_operation};
pub use chain::Chain;
pub use concept::{Concept, ConceptHandle, Queries};
pub use dispatcher::{ChainReport, DEFAULT_REQUEST_TIMEOUT, SyncEngine, SyncEngineBuilder};
pub use error::{QueryError, SyncError};
pub use frame::{Frame, Variable};
pub use matcher::Match;
pub use operation::{
    CausalId, Event, EventId, Fields, OperationKind, OperationName, OperationSpec, Outcome, Record,
    Value,
};
pub use pattern::{ActionTemplate, Arg, Expect, Literal, Pattern, Term, any, lit, var, var_or};
pub use rule::{Extension, Rule, RuleId, RuleSet};

pub(crate) use concept::Registry;

mod boundary;
mod chain;
mod concept;
mod dispatcher;
mod error;
mod frame;
mod matcher;
mod operation;
mod pattern;
mod rule;

pub type ResultSync<T> = Result<T, SyncError>;
