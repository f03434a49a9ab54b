//! Partial matches of sequence rules.
//!
//! An arc is created when constituent 0 of a sequence rule matches a fact.
//! Each later fact that matches the next constituent produces a *new* arc
//! one position further along; the arc it was derived from is never
//! modified and stays active, so one prefix can be completed by several
//! different continuations. Arcs only leave the active set when it is
//! cleared.

use crate::rule::{Rule, RuleId, When};
use crate::unify::{unify_with, Bindings};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Run-unique identifier of an arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArcId(pub u64);

/// A partially matched sequence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleArc {
    id: ArcId,
    rule: RuleId,
    position: usize,
    bindings: Bindings,
}

impl RuleArc {
    pub fn id(&self) -> ArcId {
        self.id
    }

    pub fn rule(&self) -> RuleId {
        self.rule
    }

    /// Index of the next constituent to match.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bindings accumulated from the constituents matched so far.
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

/// Outcome of offering a fact to an arc (or to constituent 0 of a rule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArcResult {
    /// The final constituent matched; the rule fires with these bindings.
    Completed(Bindings),
    /// A constituent matched; the new arc awaits the next one.
    Extended(RuleArc),
    NoMatch,
}

/// Offers `fact` to the constituent `arc` is waiting on.
///
/// `rule` must be the arc's originating rule. The arc is only read.
pub fn advance(arc: &RuleArc, rule: &Rule, fact: &Value) -> ArcResult {
    debug_assert_eq!(arc.rule, rule.id());
    let Some(when) = rule.when() else {
        return ArcResult::NoMatch;
    };
    step(when, rule.id(), arc.position, &arc.bindings, fact)
}

/// Offers `fact` to constituent 0 of a sequence rule.
///
/// A one-constituent sequence completes immediately; otherwise a match
/// creates a fresh arc at position 1. Single-pattern and inert rules never
/// spawn arcs.
pub fn spawn(rule: &Rule, fact: &Value) -> ArcResult {
    match rule.when() {
        Some(when @ When::Sequence(_)) => step(when, rule.id(), 0, &Bindings::new(), fact),
        _ => ArcResult::NoMatch,
    }
}

fn step(
    when: &When,
    rule: RuleId,
    position: usize,
    bindings: &Bindings,
    fact: &Value,
) -> ArcResult {
    let Some(pattern) = when.constituent(position) else {
        return ArcResult::NoMatch;
    };
    let Some(merged) = unify_with(pattern, fact, bindings) else {
        return ArcResult::NoMatch;
    };
    if position + 1 == when.len() {
        ArcResult::Completed(merged)
    } else {
        ArcResult::Extended(RuleArc {
            id: ArcId(0),
            rule,
            position: position + 1,
            bindings: merged,
        })
    }
}

/// The active arcs of one engine, in creation order.
#[derive(Debug, Clone, Default)]
pub struct ArcSet {
    arcs: Vec<RuleArc>,
    next_id: u64,
}

impl ArcSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an arc produced by `advance` or `spawn` and assigns its id.
    pub fn insert(&mut self, mut arc: RuleArc) -> ArcId {
        let id = ArcId(self.next_id);
        self.next_id += 1;
        arc.id = id;
        self.arcs.push(arc);
        id
    }

    /// Drops every active arc. Ids keep increasing.
    pub fn clear(&mut self) {
        self.arcs.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleArc> {
        self.arcs.iter()
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleSet;

    fn v(s: &str) -> Value {
        Value::from_json_str(s).unwrap()
    }

    fn three_step() -> RuleSet {
        RuleSet::from_json_str(
            r#"[{"when":[{"open":"$door"},{"enter":"$door"},{"close":"$door"}],
                 "then":{"passed":"$door"}}]"#,
        )
        .unwrap()
    }

    #[test]
    fn arc_walks_through_constituents() {
        let rules = three_step();
        let rule = rules.get(RuleId(0)).unwrap();

        let ArcResult::Extended(first) = spawn(rule, &v(r#"{"open":"red"}"#)) else {
            panic!("constituent 0 should match");
        };
        assert_eq!(first.position(), 1);
        assert_eq!(first.bindings()["door"], Value::text("red"));

        let ArcResult::Extended(second) = advance(&first, rule, &v(r#"{"enter":"red"}"#)) else {
            panic!("constituent 1 should match");
        };
        assert_eq!(second.position(), 2);
        assert_eq!(first.position(), 1);

        match advance(&second, rule, &v(r#"{"close":"red"}"#)) {
            ArcResult::Completed(b) => assert_eq!(b["door"], Value::text("red")),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn failed_advance_leaves_arc_untouched() {
        let rules = three_step();
        let rule = rules.get(RuleId(0)).unwrap();
        let ArcResult::Extended(arc) = spawn(rule, &v(r#"{"open":"red"}"#)) else {
            panic!("constituent 0 should match");
        };
        let before = arc.clone();
        for fact in [r#"{"enter":"blue"}"#, r#"{"close":"red"}"#, r#""enter""#] {
            assert_eq!(advance(&arc, rule, &v(fact)), ArcResult::NoMatch);
        }
        assert_eq!(arc, before);
    }

    #[test]
    fn single_constituent_sequence_completes_on_spawn() {
        let rules = RuleSet::from_json_str(r#"[{"when":["$x"],"then":"seen"}]"#).unwrap();
        let rule = rules.get(RuleId(0)).unwrap();
        assert!(matches!(spawn(rule, &v("1")), ArcResult::Completed(_)));
    }

    #[test]
    fn single_and_inert_rules_never_spawn() {
        let rules =
            RuleSet::from_json_str(r#"[{"when":"a","then":"b"},{"then":"c"}]"#).unwrap();
        for rule in rules.iter() {
            assert_eq!(spawn(rule, &v(r#""a""#)), ArcResult::NoMatch);
        }
    }

    #[test]
    fn insert_assigns_ids_that_survive_clear() {
        let rules = three_step();
        let rule = rules.get(RuleId(0)).unwrap();
        let mut set = ArcSet::new();
        let mut ids = Vec::new();
        for door in ["a", "b"] {
            if let ArcResult::Extended(arc) = spawn(rule, &Value::mapping([("open", Value::text(door))])) {
                ids.push(set.insert(arc));
            }
        }
        assert_eq!(ids, vec![ArcId(0), ArcId(1)]);
        assert_eq!(set.iter().map(RuleArc::id).collect::<Vec<_>>(), ids);
        set.clear();
        assert!(set.is_empty());

        let ArcResult::Extended(arc) = spawn(rule, &v(r#"{"open":"c"}"#)) else {
            panic!("constituent 0 should match");
        };
        assert_eq!(set.insert(arc), ArcId(2));
    }
}
