//! Incremental join of rule patterns against a chain's history.

use tracing::trace;

use crate::{Chain, Event, EventId, Frame, RuleId, RuleSet};

/// One satisfying combination: the events filling each `when` position, in
/// declared order, and the frame they produce.
#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub rule: RuleId,
    pub events: Vec<EventId>,
    pub frame: Frame,
}

struct Partial {
    slots: Vec<Option<EventId>>,
    frame: Frame,
}

/// Every rule combination completed by `event`.
///
/// `event` must already be recorded in `chain`. Each returned match uses
/// `event` in at least one position; other positions are filled from the
/// chain's history, each event occupying at most one position.
pub fn matches(rules: &RuleSet, chain: &Chain, event: &Event) -> Vec<Match> {
    let mut found = Vec::new();

    for &(rule_id, seed_position) in rules.watching(&event.operation) {
        let Some(rule) = rules.get(rule_id) else {
            continue;
        };
        let patterns = rule.patterns();
        let Some(frame) = patterns[seed_position].unify(event, &Frame::new()) else {
            continue;
        };

        let mut slots = vec![None; patterns.len()];
        slots[seed_position] = Some(event.id);
        let mut partials = vec![Partial { slots, frame }];

        for (position, pattern) in patterns.iter().enumerate() {
            if position == seed_position {
                continue;
            }
            let mut next = Vec::new();
            for partial in &partials {
                for candidate in chain.events_for(&pattern.operation) {
                    if partial.slots.contains(&Some(candidate.id)) {
                        continue;
                    }
                    if let Some(frame) = pattern.unify(candidate, &partial.frame) {
                        let mut slots = partial.slots.clone();
                        slots[position] = Some(candidate.id);
                        next.push(Partial { slots, frame });
                    }
                }
            }
            partials = next;
            if partials.is_empty() {
                break;
            }
        }

        for partial in partials {
            let events: Vec<EventId> = partial.slots.into_iter().flatten().collect();
            trace!(rule = rule.name(), ?events, "rule matched");
            found.push(Match {
                rule: rule_id,
                events,
                frame: partial.frame,
            });
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        ActionTemplate, CausalId, OperationName, OperationSpec, Outcome, Pattern, Rule, lit,
        record,
    };

    fn catalog() -> HashMap<OperationName, OperationSpec> {
        [
            OperationSpec::action("A", "a").inputs(&["x"]).success(&["y"]),
            OperationSpec::action("B", "b").inputs(&["x"]).success(&["z"]),
            OperationSpec::action("C", "c").inputs(&["y", "z"]),
        ]
        .into_iter()
        .map(|spec| (spec.name.clone(), spec))
        .collect()
    }

    fn join_rule() -> RuleSet {
        let rule = Rule::new("Join")
            .when(Pattern::on("A.a").inputs(&["x"]).outputs(&["y"]))
            .when(Pattern::on("B.b").inputs(&["x"]).outputs(&["z"]))
            .then(ActionTemplate::call("C.c").args(&["y", "z"]));
        RuleSet::compile(vec![rule], &catalog()).unwrap()
    }

    fn last(chain: &Chain) -> &Event {
        chain.events().last().unwrap()
    }

    #[test]
    fn incomplete_conjunction_is_inert() {
        let rules = join_rule();
        let mut chain = Chain::new(CausalId::new());
        chain.record("A.a".into(), record! { "x" => 1 }, Outcome::success(record! { "y" => 7 }));
        assert!(matches(&rules, &chain, last(&chain)).is_empty());
    }

    #[test]
    fn join_binds_shared_variable() {
        let rules = join_rule();
        let mut chain = Chain::new(CausalId::new());
        chain.record("A.a".into(), record! { "x" => 1 }, Outcome::success(record! { "y" => 7 }));
        chain.record("A.a".into(), record! { "x" => 2 }, Outcome::success(record! { "y" => 8 }));
        chain.record("B.b".into(), record! { "x" => 1 }, Outcome::success(record! { "z" => 3 }));

        let found = matches(&rules, &chain, last(&chain));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].events, vec![EventId(0), EventId(2)]);
        assert_eq!(found[0].frame.require_i64("y"), Ok(7));
        assert_eq!(found[0].frame.require_i64("z"), Ok(3));
    }

    #[test]
    fn one_match_per_compatible_candidate() {
        let rule = Rule::new("Pair")
            .when(Pattern::on("A.a").input("x", lit(1)))
            .when(Pattern::on("B.b").outputs(&["z"]));
        let rules = RuleSet::compile(vec![rule], &catalog()).unwrap();

        let mut chain = Chain::new(CausalId::new());
        chain.record("B.b".into(), record! { "x" => 0 }, Outcome::success(record! { "z" => 1 }));
        chain.record("B.b".into(), record! { "x" => 0 }, Outcome::success(record! { "z" => 2 }));
        chain.record("A.a".into(), record! { "x" => 1 }, Outcome::success(record! { "y" => 0 }));

        let found = matches(&rules, &chain, last(&chain));
        let zs: Vec<_> = found.iter().map(|m| m.frame.require_i64("z").unwrap()).collect();
        assert_eq!(zs, vec![1, 2]);
    }

    #[test]
    fn event_fills_at_most_one_position() {
        let rule = Rule::new("Twice")
            .when(Pattern::on("A.a").outputs(&["y"]))
            .when(Pattern::on("A.a"));
        let rules = RuleSet::compile(vec![rule], &catalog()).unwrap();

        let mut chain = Chain::new(CausalId::new());
        chain.record("A.a".into(), record! { "x" => 1 }, Outcome::success(record! { "y" => 1 }));
        assert!(matches(&rules, &chain, last(&chain)).is_empty());

        chain.record("A.a".into(), record! { "x" => 2 }, Outcome::success(record! { "y" => 2 }));
        assert_eq!(matches(&rules, &chain, last(&chain)).len(), 2);
    }

    #[test]
    fn error_outcome_does_not_seed_success_pattern() {
        let rules = join_rule();
        let mut chain = Chain::new(CausalId::new());
        chain.record("A.a".into(), record! { "x" => 1 }, Outcome::success(record! { "y" => 7 }));
        chain.record("B.b".into(), record! { "x" => 1 }, Outcome::error("nope"));
        assert!(matches(&rules, &chain, last(&chain)).is_empty());
    }
}
