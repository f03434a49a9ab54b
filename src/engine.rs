//! The forward-chaining engine.
//!
//! `run_assert` drains an agenda seeded with the asserted fact. Each fact is
//! offered to every active arc and then to every rule, in declaration order;
//! completed matches instantiate the rule's `then` template and the result
//! goes to the back of the agenda. Command facts go to their plugin instead,
//! and the clear-arcs control fact empties the arc set.
//!
//! The engine owns all of its state. Separate engines share nothing, so one
//! engine per session is enough for concurrent use.
//!
//! # Citations
//! - Forward chaining: Brownston et al., "Programming Expert Systems in OPS5" (1985)
//! - Agenda-driven recognize-act cycle: Forgy, "Rete: A fast algorithm for the many pattern/many object pattern match problem" (1982)

use crate::agenda::Agenda;
use crate::arc::{advance, spawn, ArcResult, ArcSet, RuleArc};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::plugin::{Plugin, PluginError, PluginRegistry};
use crate::rule::{Rule, RuleSet, When};
use crate::traceability::{Production, RunTrace, StepKind, TraceStep};
use crate::unify::{substitute, unify, Bindings};
use crate::value::Value;
use thiserror::Error;
use tracing::{debug, debug_span, info, trace, warn};

/// Error type for engine runs.
///
/// Each variant carries the trace of the facts processed before the run
/// stopped.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("plugin `{moniker}` failed: {source}")]
    Plugin {
        moniker: String,
        #[source]
        source: PluginError,
        trace: Box<RunTrace>,
    },
    #[error("run exceeded the limit of {limit} processed facts")]
    StepLimitExceeded { limit: usize, trace: Box<RunTrace> },
}

impl EngineError {
    /// Steps recorded up to the failure.
    pub fn partial_trace(&self) -> &RunTrace {
        match self {
            Self::Plugin { trace, .. } | Self::StepLimitExceeded { trace, .. } => trace,
        }
    }
}

/// Why a drain stopped early; turned into an [`EngineError`] once the
/// partial trace is complete.
#[derive(Debug)]
enum Halt {
    Plugin { moniker: String, source: PluginError },
    StepLimit { limit: usize },
}

impl Halt {
    fn into_error(self, trace: RunTrace) -> EngineError {
        let trace = Box::new(trace);
        match self {
            Halt::Plugin { moniker, source } => EngineError::Plugin {
                moniker,
                source,
                trace,
            },
            Halt::StepLimit { limit } => EngineError::StepLimitExceeded { limit, trace },
        }
    }
}

/// Whether a run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

/// Rule store, active arcs, plugins and context for one session.
#[derive(Debug)]
pub struct Engine {
    rules: RuleSet,
    arcs: ArcSet,
    plugins: PluginRegistry,
    context: Context,
    config: EngineConfig,
    state: RunState,
}

impl Engine {
    /// Creates an engine with default configuration and no plugins.
    pub fn new(rules: RuleSet) -> Self {
        Self::with_config(rules, EngineConfig::default())
    }

    pub fn with_config(rules: RuleSet, config: EngineConfig) -> Self {
        Self {
            rules,
            arcs: ArcSet::new(),
            plugins: PluginRegistry::new(),
            context: Context::new(),
            config,
            state: RunState::Idle,
        }
    }

    /// Replaces the plugin registry.
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn register_plugin(&mut self, moniker: impl Into<String>, plugin: impl Plugin + 'static) {
        self.plugins.register(moniker, plugin);
    }

    pub fn register_fn<F>(&mut self, moniker: impl Into<String>, f: F)
    where
        F: Fn(&Value, &mut Context) -> Result<Option<Vec<Value>>, PluginError> + Send + Sync + 'static,
    {
        self.plugins.register_fn(moniker, f);
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn arcs(&self) -> &ArcSet {
        &self.arcs
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Empties the active arc set, returning how many arcs were dropped.
    pub fn clear_arcs(&mut self) -> usize {
        let cleared = self.arcs.len();
        self.arcs.clear();
        debug!(cleared, "arcs cleared");
        cleared
    }

    /// Asserts a fact, or a list of facts, and runs until the agenda is empty.
    ///
    /// Arcs and context persist across calls; the agenda does not.
    pub fn run_assert(&mut self, input: Value) -> Result<RunTrace, EngineError> {
        let _span = debug_span!("run_assert").entered();
        let mut trace = RunTrace::new(self.rules.fingerprint(), input.clone());
        let mut agenda = Agenda::new();
        agenda.push(input);
        info!(rules = self.rules.len(), arcs = self.arcs.len(), "run started");

        self.state = RunState::Running;
        let drained = self.drain(&mut agenda, &mut trace);
        self.state = RunState::Idle;
        if let Err(halt) = drained {
            return Err(halt.into_error(trace));
        }

        info!(
            steps = trace.step_count(),
            productions = trace.productions().count(),
            arcs = self.arcs.len(),
            "run finished"
        );
        Ok(trace)
    }

    fn drain(&mut self, agenda: &mut Agenda, trace: &mut RunTrace) -> Result<(), Halt> {
        while let Some(fact) = agenda.pop() {
            self.process(fact, agenda, trace)?;
        }
        Ok(())
    }

    /// Processes one agenda entry. Lists are expanded in place, in order.
    ///
    /// Variables are resolved per element, just before it is processed, so
    /// context changes made by earlier elements are visible to later ones.
    fn process(&mut self, fact: Value, agenda: &mut Agenda, trace: &mut RunTrace) -> Result<(), Halt> {
        if let Value::List(items) = fact {
            return self.expand(items, agenda, trace);
        }
        let fact = self.context.resolve(&fact);
        if let Value::List(items) = fact {
            return self.expand(items, agenda, trace);
        }

        if let Some(limit) = self.config.max_steps {
            if trace.step_count() >= limit {
                warn!(limit, pending = agenda.len(), "step limit reached");
                return Err(Halt::StepLimit { limit });
            }
        }

        let mut step = TraceStep::new(trace.step_count(), fact);
        debug!(index = step.index, fact = %step.fact, "processing fact");

        if step.fact.head() == Some(self.config.clear_arcs_moniker.as_str()) {
            step.kind = StepKind::ClearArcs {
                cleared: self.clear_arcs(),
            };
        } else if let Some(moniker) = self.plugins.moniker_of(&step.fact).map(str::to_string) {
            step.emitted = self.dispatch(&moniker, &step.fact)?;
            agenda.extend(step.emitted.iter().cloned());
            step.kind = StepKind::Command { moniker };
        } else {
            self.match_fact(&mut step);
            agenda.extend(step.productions.iter().map(|p| p.fact.clone()));
        }

        trace.record(step);
        Ok(())
    }

    fn expand(&mut self, items: Vec<Value>, agenda: &mut Agenda, trace: &mut RunTrace) -> Result<(), Halt> {
        for item in items {
            self.process(item, agenda, trace)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, moniker: &str, fact: &Value) -> Result<Vec<Value>, Halt> {
        let Some(plugin) = self.plugins.get(moniker) else {
            return Ok(Vec::new());
        };
        match plugin.process(fact, &mut self.context) {
            Ok(emitted) => {
                let emitted = emitted.unwrap_or_default();
                debug!(moniker, emitted = emitted.len(), "command dispatched");
                Ok(emitted)
            }
            Err(source) => {
                warn!(moniker, error = %source, "plugin failed");
                Err(Halt::Plugin {
                    moniker: moniker.to_string(),
                    source,
                })
            }
        }
    }

    /// Offers the step's fact to every arc, then to every rule.
    ///
    /// Arcs registered here are not offered the same fact.
    fn match_fact(&mut self, step: &mut TraceStep) {
        let fact = &step.fact;
        let mut new_arcs: Vec<RuleArc> = Vec::new();
        let mut completions: Vec<(&Rule, Bindings)> = Vec::new();

        for arc in self.arcs.iter() {
            let Some(rule) = self.rules.get(arc.rule()) else {
                continue;
            };
            match advance(arc, rule, fact) {
                ArcResult::Completed(bindings) => completions.push((rule, bindings)),
                ArcResult::Extended(next) => new_arcs.push(next),
                ArcResult::NoMatch => {}
            }
        }

        for rule in self.rules.iter() {
            match rule.when() {
                None => {}
                Some(When::Single(pattern)) => {
                    if let Some(bindings) = unify(pattern, fact) {
                        completions.push((rule, bindings));
                    }
                }
                Some(When::Sequence(_)) => match spawn(rule, fact) {
                    ArcResult::Completed(bindings) => completions.push((rule, bindings)),
                    ArcResult::Extended(arc) => new_arcs.push(arc),
                    ArcResult::NoMatch => {}
                },
            }
        }

        let matched = !completions.is_empty() || !new_arcs.is_empty();
        let productions: Vec<Production> = completions
            .into_iter()
            .filter_map(|(rule, bindings)| fire(rule, bindings))
            .collect();

        step.arcs_created = new_arcs.len();
        for arc in new_arcs {
            let id = self.arcs.insert(arc);
            trace!(arc = id.0, "arc registered");
        }

        if matched {
            step.kind = StepKind::Matched;
            step.productions = productions;
        } else {
            debug!(fact = %step.fact, "no rule or arc matched; fact dropped");
        }
    }
}

/// Instantiates the rule's template, if it has one.
fn fire(rule: &Rule, bindings: Bindings) -> Option<Production> {
    let Some(template) = rule.then() else {
        debug!(rule = %rule.label(), "rule completed without a `then` template");
        return None;
    };
    let fact = substitute(template, &bindings);
    debug!(rule = %rule.label(), production = %fact, "rule fired");
    Some(Production {
        rule: rule.id(),
        rule_name: rule.name().map(str::to_string),
        fact,
        bindings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleId;

    fn v(s: &str) -> Value {
        Value::from_json_str(s).unwrap()
    }

    fn engine(rules: &str) -> Engine {
        Engine::new(RuleSet::from_json_str(rules).unwrap())
    }

    fn facts(trace: &RunTrace) -> Vec<Value> {
        trace.facts().cloned().collect()
    }

    fn produced(trace: &RunTrace) -> Vec<Value> {
        trace.productions().map(|p| p.fact.clone()).collect()
    }

    #[test]
    fn ping_pong() {
        let mut e = engine(r#"[{"when":"ping","then":"pong"}]"#);
        let trace = e.run_assert(Value::text("ping")).unwrap();
        assert_eq!(facts(&trace), vec![Value::text("ping"), Value::text("pong")]);
        assert_eq!(produced(&trace), vec![Value::text("pong")]);
        assert_eq!(trace.steps()[0].kind, StepKind::Matched);
        assert_eq!(trace.steps()[1].kind, StepKind::Dropped);
    }

    #[test]
    fn productions_are_processed_breadth_first() {
        let mut e = engine(
            r#"[{"when":"X","then":"Y"},{"when":"Y","then":"Z"},
                {"when":"X","then":"W"}]"#,
        );
        let trace = e.run_assert(Value::text("X")).unwrap();
        // Y and W both derive from X, so both precede Z.
        assert_eq!(
            facts(&trace),
            ["X", "Y", "W", "Z"].map(Value::text).to_vec()
        );
    }

    #[test]
    fn chain_order_is_x_y_z() {
        let mut e = engine(r#"[{"when":"X","then":"Y"},{"when":"Y","then":"Z"}]"#);
        let trace = e.run_assert(Value::text("X")).unwrap();
        assert_eq!(facts(&trace), ["X", "Y", "Z"].map(Value::text).to_vec());
    }

    #[test]
    fn sequence_rule_requires_order() {
        let rules = r#"[{"when":["A","B"],"then":"C"}]"#;

        let mut forward = engine(rules);
        forward.run_assert(Value::text("A")).unwrap();
        let trace = forward.run_assert(Value::text("B")).unwrap();
        assert_eq!(produced(&trace), vec![Value::text("C")]);

        let mut backward = engine(rules);
        let first = backward.run_assert(Value::text("B")).unwrap();
        let second = backward.run_assert(Value::text("A")).unwrap();
        assert_eq!(first.productions().count() + second.productions().count(), 0);
    }

    #[test]
    fn sequence_within_one_run_via_list_input() {
        let mut e = engine(r#"[{"when":["A","B"],"then":"C"}]"#);
        let trace = e.run_assert(v(r#"["A","B"]"#)).unwrap();
        assert_eq!(facts(&trace), ["A", "B", "C"].map(Value::text).to_vec());
        assert_eq!(produced(&trace), vec![Value::text("C")]);
    }

    #[test]
    fn arcs_carry_bindings_across_constituents() {
        let mut e = engine(
            r#"[{"name":"handoff",
                 "when":[{"give":"$item","to":"$who"},{"thanks":"$who"}],
                 "then":{"owns":"$who","item":"$item"}}]"#,
        );
        let trace = e
            .run_assert(v(r#"[{"give":"book","to":"ada"},{"thanks":"bob"},{"thanks":"ada"}]"#))
            .unwrap();
        let productions: Vec<_> = trace.productions().collect();
        assert_eq!(productions.len(), 1);
        assert_eq!(productions[0].fact, v(r#"{"owns":"ada","item":"book"}"#));
        assert_eq!(productions[0].rule_name.as_deref(), Some("handoff"));
        assert_eq!(productions[0].rule, RuleId(0));
    }

    #[test]
    fn concurrent_arcs_of_one_rule_do_not_interfere() {
        let mut e = engine(
            r#"[{"when":[{"start":"$job"},{"finish":"$job"}],"then":{"done":"$job"}}]"#,
        );
        e.run_assert(v(r#"[{"start":"a"},{"start":"b"}]"#)).unwrap();
        assert_eq!(e.arcs().len(), 2);

        let first = e.run_assert(v(r#"{"finish":"a"}"#)).unwrap();
        assert_eq!(produced(&first), vec![v(r#"{"done":"a"}"#)]);
        assert_eq!(e.arcs().len(), 2);

        let second = e.run_assert(v(r#"{"finish":"b"}"#)).unwrap();
        assert_eq!(produced(&second), vec![v(r#"{"done":"b"}"#)]);
    }

    #[test]
    fn completed_prefix_stays_active() {
        let mut e = engine(r#"[{"when":["A","B"],"then":"C"}]"#);
        let trace = e.run_assert(v(r#"["A","B","B"]"#)).unwrap();
        assert_eq!(produced(&trace), vec![Value::text("C"), Value::text("C")]);
    }

    #[test]
    fn new_arcs_are_not_offered_the_fact_that_created_them() {
        let mut e = engine(r#"[{"when":["A","A"],"then":"AA"}]"#);
        let one = e.run_assert(Value::text("A")).unwrap();
        assert_eq!(one.productions().count(), 0);
        assert_eq!(one.steps()[0].arcs_created, 1);
        let two = e.run_assert(Value::text("A")).unwrap();
        assert_eq!(produced(&two), vec![Value::text("AA")]);
    }

    #[test]
    fn clear_arcs_control_fact_resets_arcs() {
        let mut e = engine(r#"[{"when":["A","B"],"then":"C"}]"#);
        let trace = e.run_assert(v(r#"["A","clear-arcs","B"]"#)).unwrap();
        assert_eq!(trace.productions().count(), 0);
        assert_eq!(trace.steps()[1].kind, StepKind::ClearArcs { cleared: 1 });
        assert!(e.arcs().is_empty());

        let mapping_form = e.run_assert(v(r#"[{"clear-arcs":true}]"#)).unwrap();
        assert_eq!(mapping_form.steps()[0].kind, StepKind::ClearArcs { cleared: 0 });
    }

    #[test]
    fn clear_arcs_moniker_is_configurable() {
        let rules = RuleSet::from_json_str(r#"[{"when":["A","B"],"then":"C"}]"#).unwrap();
        let config = EngineConfig::default().with_clear_arcs_moniker("reset");
        let mut e = Engine::with_config(rules, config);
        let trace = e.run_assert(v(r#"["A","reset","B"]"#)).unwrap();
        assert_eq!(trace.productions().count(), 0);
    }

    #[test]
    fn failed_matching_leaves_rules_and_arcs_unchanged() {
        let mut e = engine(r#"[{"when":["A","B"],"then":"C"},{"when":"X","then":"Y"}]"#);
        e.run_assert(Value::text("A")).unwrap();
        let rules_before = e.rules().fingerprint();
        let arcs_before: Vec<_> = e.arcs().iter().cloned().collect();

        for _ in 0..3 {
            let trace = e.run_assert(Value::text("nothing")).unwrap();
            assert_eq!(trace.dropped().count(), 1);
        }
        assert_eq!(e.rules().fingerprint(), rules_before);
        assert_eq!(e.arcs().iter().cloned().collect::<Vec<_>>(), arcs_before);
    }

    #[test]
    fn inert_rules_and_rules_without_then() {
        let mut e = engine(r#"[{"then":"never"},{"when":"A"},{"when":"A","then":"B"}]"#);
        let trace = e.run_assert(Value::text("A")).unwrap();
        assert_eq!(produced(&trace), vec![Value::text("B")]);
        assert_eq!(trace.steps()[0].kind, StepKind::Matched);
    }

    #[test]
    fn plugins_consume_commands_and_emit_facts() {
        let mut e = engine(r##"[{"when":"#ask","then":"unreachable"},{"when":"answer","then":"done"}]"##);
        e.register_fn("#ask", |_fact, ctx| {
            ctx.set("asked", Value::from(true));
            Ok(Some(vec![Value::text("answer")]))
        });
        let trace = e.run_assert(Value::text("#ask")).unwrap();
        assert_eq!(facts(&trace), ["#ask", "answer", "done"].map(Value::text).to_vec());
        assert_eq!(
            trace.steps()[0].kind,
            StepKind::Command { moniker: "#ask".to_string() }
        );
        assert_eq!(trace.steps()[0].emitted, vec![Value::text("answer")]);
        assert_eq!(e.context().get("asked"), Some(&Value::from(true)));
    }

    #[test]
    fn plugin_failure_is_fatal() {
        let mut e = engine("[]");
        e.register_fn("#boom", |_fact, _ctx| Err(PluginError::Failed("no network".into())));
        let err = e.run_assert(v(r##"["ok",{"#boom":1},"never"]"##)).unwrap_err();
        match &err {
            EngineError::Plugin { moniker, source, .. } => {
                assert_eq!(moniker, "#boom");
                assert_eq!(source.to_string(), "no network");
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Only the fact before the failing command was recorded.
        let partial: Vec<_> = err.partial_trace().facts().cloned().collect();
        assert_eq!(partial, vec![Value::text("ok")]);
    }

    #[test]
    fn builtin_set_feeds_variable_resolution() {
        let rules = RuleSet::from_json_str(r#"[{"when":{"greet":"$name"},"then":{"hello":"$name"}}]"#)
            .unwrap();
        let mut e = Engine::new(rules).with_plugins(PluginRegistry::with_builtins());
        let trace = e
            .run_assert(v(r##"[{"#set":{"user":"ada"}},{"greet":"$user"}]"##))
            .unwrap();
        assert_eq!(trace.steps()[1].fact, v(r#"{"greet":"ada"}"#));
        assert_eq!(produced(&trace), vec![v(r#"{"hello":"ada"}"#)]);
    }

    #[test]
    fn set_earlier_in_list_overrides_existing_context() {
        let rules = RuleSet::from_json_str(r#"[{"when":{"greet":"$name"},"then":{"hello":"$name"}}]"#)
            .unwrap();
        let mut e = Engine::new(rules).with_plugins(PluginRegistry::with_builtins());
        e.context_mut().set("user", Value::text("bob"));
        let trace = e
            .run_assert(v(r##"[{"#set":{"user":"ada"}},{"greet":"$user"}]"##))
            .unwrap();
        assert_eq!(trace.steps()[1].fact, v(r#"{"greet":"ada"}"#));
        assert_eq!(produced(&trace), vec![v(r#"{"hello":"ada"}"#)]);
        assert_eq!(e.context().get("user"), Some(&Value::text("ada")));
    }

    #[test]
    fn set_payload_sees_values_set_by_earlier_elements() {
        let mut e = engine("[]").with_plugins(PluginRegistry::with_builtins());
        e.context_mut().set("a", Value::text("old"));
        e.run_assert(v(r##"[{"#set":{"a":"new"}},{"#set":{"b":"$a"}}]"##))
            .unwrap();
        assert_eq!(e.context().get("b"), Some(&Value::text("new")));
    }

    #[test]
    fn emit_plugin_output_goes_to_back_of_agenda() {
        let mut e = engine(r#"[{"when":"a","then":"a2"}]"#).with_plugins(PluginRegistry::with_builtins());
        let trace = e.run_assert(v(r##"[{"#emit":["b","c"]},"a"]"##)).unwrap();
        assert_eq!(
            facts(&trace),
            vec![v(r##"{"#emit":["b","c"]}"##), Value::text("a"), Value::text("b"), Value::text("c"), Value::text("a2")]
        );
    }

    #[test]
    fn step_limit_stops_cycles() {
        let rules = RuleSet::from_json_str(r#"[{"when":"tick","then":"tick"}]"#).unwrap();
        let mut e = Engine::with_config(rules, EngineConfig::default().with_max_steps(Some(25)));
        let err = e.run_assert(Value::text("tick")).unwrap_err();
        assert!(matches!(err, EngineError::StepLimitExceeded { limit: 25, .. }));
        assert_eq!(err.partial_trace().step_count(), 25);
        assert!(err.partial_trace().facts().all(|f| *f == Value::text("tick")));
        assert_eq!(e.state(), RunState::Idle);
    }

    #[test]
    fn nested_lists_expand_depth_first_in_order() {
        let mut e = engine("[]");
        let trace = e.run_assert(v(r#"["a",["b",["c"]],"d"]"#)).unwrap();
        assert_eq!(facts(&trace), ["a", "b", "c", "d"].map(Value::text).to_vec());
        assert!(trace.steps().iter().enumerate().all(|(i, s)| s.index == i));
    }

    #[test]
    fn trace_records_rule_set_fingerprint() {
        let mut e = engine(r#"[{"when":"ping","then":"pong"}]"#);
        let trace = e.run_assert(Value::text("ping")).unwrap();
        assert!(trace.verify_rules(e.rules()).is_ok());
        assert_eq!(trace.input(), &Value::text("ping"));
    }

    #[test]
    fn independent_engines_share_nothing() {
        let rules = r#"[{"when":["A","B"],"then":"C"}]"#;
        let mut left = engine(rules);
        let mut right = engine(rules);
        left.run_assert(Value::text("A")).unwrap();
        assert_eq!(left.arcs().len(), 1);
        assert!(right.arcs().is_empty());
        assert_eq!(right.run_assert(Value::text("B")).unwrap().productions().count(), 0);
    }
}
