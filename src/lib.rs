//! Rulechain: a forward-chaining rule engine over JSON-like facts.
//!
//! Rules pair a `when` pattern with a `then` template. Asserting a fact runs
//! it against every rule; each match instantiates the template with the
//! variable bindings from unification and the produced fact is asserted in
//! turn. Rules whose `when` is a list match a sequence of facts arriving
//! over time, tracked as partially-matched arcs. Command facts are handed to
//! registered plugins instead of being matched.
//!
//! # Model
//!
//! - Facts are scalars, mappings, or lists. Text starting with `$` is a
//!   variable when it appears in a pattern or template.
//! - A mapping pattern matches any mapping that has at least its keys.
//! - The agenda is FIFO, so derived facts are processed breadth first.
//!
//! # References
//!
//! - Forgy, C. "OPS5 User's Manual" (1981) – recognize-act cycle
//! - Robinson, J.A. "A machine-oriented logic based on the resolution principle" (1965) – unification
//! - Earley, J. "An efficient context-free parsing algorithm" (1970) – dotted items, the model for arcs
//!
//! # Example
//!
//! ```
//! use rulechain::prelude::*;
//!
//! let rules = RuleSet::from_json_str(r#"[{"when": "ping", "then": "pong"}]"#).unwrap();
//! let mut engine = Engine::new(rules);
//! let trace = engine.run_assert(Value::text("ping")).unwrap();
//! let facts: Vec<_> = trace.facts().cloned().collect();
//! assert_eq!(facts, vec![Value::text("ping"), Value::text("pong")]);
//! ```

pub mod agenda;
pub mod arc;
pub mod config;
pub mod constants;
pub mod context;
pub mod engine;
pub mod fingerprint;
pub mod plugin;
pub mod rule;
pub mod traceability;
pub mod unify;
pub mod value;

pub use config::{Config, ConfigError, EngineConfig};
pub use engine::{Engine, EngineError, RunState};
pub use plugin::{Plugin, PluginError, PluginRegistry};
pub use rule::{Rule, RuleError, RuleId, RuleSet, When};
pub use traceability::{Production, RunTrace, StepKind, TraceError, TraceStep};
pub use value::{Scalar, Value};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::arc::{ArcId, ArcSet, RuleArc};
    pub use crate::config::{Config, EngineConfig};
    pub use crate::context::Context;
    pub use crate::engine::{Engine, EngineError, RunState};
    pub use crate::fingerprint::{Canonicalizable, HashValue};
    pub use crate::plugin::{FnPlugin, Plugin, PluginError, PluginRegistry};
    pub use crate::rule::{Rule, RuleId, RuleSet, When};
    pub use crate::traceability::{Production, RunTrace, StepKind, TraceStep};
    pub use crate::unify::{substitute, unify, Bindings};
    pub use crate::value::Value;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    fn v(s: &str) -> Value {
        Value::from_json_str(s).unwrap()
    }

    /// An engine with no rules drops every fact.
    #[test]
    fn empty_rule_set() {
        let mut engine = Engine::new(RuleSet::new());
        let trace = engine.run_assert(Value::text("anything")).unwrap();
        assert_eq!(trace.step_count(), 1);
        assert_eq!(trace.dropped().count(), 1);
        assert!(engine.arcs().is_empty());
    }

    /// Rules built in code and rules parsed from JSON behave the same.
    #[test]
    fn programmatic_and_parsed_rules_agree() {
        let built: RuleSet = [
            Rule::single(v(r#"{"temp":"$t","unit":"C"}"#), v(r#"{"reading":"$t"}"#)).named("celsius"),
        ]
        .into_iter()
        .collect();
        let parsed = RuleSet::from_json_str(
            r#"[{"name":"celsius","when":{"temp":"$t","unit":"C"},"then":{"reading":"$t"}}]"#,
        )
        .unwrap();
        assert_eq!(built.fingerprint(), parsed.fingerprint());

        let fact = v(r#"{"temp":21,"unit":"C","sensor":"hall"}"#);
        let a = Engine::new(built).run_assert(fact.clone()).unwrap();
        let b = Engine::new(parsed).run_assert(fact).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.productions().next().map(|p| p.fact.clone()), Some(v(r#"{"reading":21}"#)));
    }

    /// Sequence rules, plugins and the context working together across runs.
    #[test]
    fn session_across_runs() {
        let rules = RuleSet::from_json_str(
            r##"[
                {"when":[{"order":"$id"},{"paid":"$id"}],"then":{"#emit":{"ship":"$id"}}},
                {"when":{"ship":"$id"},"then":{"#set":{"last_shipped":"$id"}}}
            ]"##,
        )
        .unwrap();
        let mut engine = Engine::new(rules).with_plugins(PluginRegistry::with_builtins());

        engine.run_assert(v(r#"{"order":7}"#)).unwrap();
        engine.run_assert(v(r#"{"order":8}"#)).unwrap();
        let trace = engine.run_assert(v(r#"{"paid":8}"#)).unwrap();

        assert_eq!(engine.context().get("last_shipped"), Some(&Value::from(8i64)));
        let kinds: Vec<_> = trace.steps().iter().map(|s| s.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Matched,
                StepKind::Command { moniker: "#emit".into() },
                StepKind::Matched,
                StepKind::Command { moniker: "#set".into() },
            ]
        );
    }
}
