//! Per-request causal context.

use std::collections::{HashMap, HashSet};

use crate::{CausalId, Event, EventId, OperationName, Outcome, Record, RuleId};

/// History and dedup state of one causal chain.
///
/// Owned by exactly one chain driver; dropped once the chain is quiescent.
#[derive(Debug)]
pub struct Chain {
    causal_id: CausalId,
    events: Vec<Event>,
    by_operation: HashMap<OperationName, Vec<EventId>>,
    fired: HashSet<(RuleId, Vec<EventId>)>,
    responded: bool,
}

impl Chain {
    pub fn new(causal_id: CausalId) -> Self {
        Self {
            causal_id,
            events: Vec::new(),
            by_operation: HashMap::new(),
            fired: HashSet::new(),
            responded: false,
        }
    }

    pub fn causal_id(&self) -> CausalId {
        self.causal_id
    }

    /// Append a completed invocation and return its id.
    pub fn record(&mut self, operation: OperationName, inputs: Record, outcome: Outcome) -> EventId {
        let id = EventId(self.events.len() as u64);
        self.by_operation
            .entry(operation.clone())
            .or_default()
            .push(id);
        self.events.push(Event {
            id,
            causal_id: self.causal_id,
            operation,
            inputs,
            outcome,
        });
        id
    }

    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.get(id.0 as usize)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events of `operation`, oldest first.
    pub fn events_for<'a>(&'a self, operation: &OperationName) -> impl Iterator<Item = &'a Event> + 'a {
        self.by_operation
            .get(operation)
            .into_iter()
            .flatten()
            .filter_map(|id| self.event(*id))
    }

    /// Register a dispatch. Returns `false` when the same rule already fired
    /// for the same combination of events.
    pub fn mark_fired(&mut self, rule: RuleId, events: Vec<EventId>) -> bool {
        self.fired.insert((rule, events))
    }

    /// Claim the chain's single response. Returns `false` once claimed.
    pub fn claim_respond(&mut self) -> bool {
        !std::mem::replace(&mut self.responded, true)
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_indexed_by_operation() {
        let mut chain = Chain::new(CausalId::new());
        let a = chain.record("A.x".into(), Record::new(), Outcome::done());
        chain.record("B.y".into(), Record::new(), Outcome::done());
        let c = chain.record("A.x".into(), Record::new(), Outcome::done());

        let ids: Vec<_> = chain.events_for(&"A.x".into()).map(|e| e.id).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(chain.events_for(&"C.z".into()).count(), 0);
    }

    #[test]
    fn combination_fires_once() {
        let mut chain = Chain::new(CausalId::new());
        assert!(chain.mark_fired(RuleId(0), vec![EventId(0), EventId(1)]));
        assert!(!chain.mark_fired(RuleId(0), vec![EventId(0), EventId(1)]));
        assert!(chain.mark_fired(RuleId(0), vec![EventId(0), EventId(2)]));
        assert!(chain.mark_fired(RuleId(1), vec![EventId(0), EventId(1)]));
    }

    #[test]
    fn respond_is_claimed_once() {
        let mut chain = Chain::new(CausalId::new());
        assert!(chain.claim_respond());
        assert!(!chain.claim_respond());
    }
}
