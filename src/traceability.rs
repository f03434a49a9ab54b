//! Run traces: the ordered record of what one `run_assert` call did.
//!
//! Every fact popped from the agenda becomes a [`TraceStep`] in processing
//! order, so the trace doubles as the agenda order. Traces can be persisted
//! as CBOR and carry the fingerprint of the rule set they were produced
//! under, so a stored trace can be checked against the rules it claims.
//!
//! # Citations
//! - Production system traces: Forgy, "OPS5 User's Manual", Section 5 (1981)
//! - Content-addressed records: Merkle, "A digital signature based on a conventional encryption function" (1987)

use crate::constants::DOMAIN_RUN_TRACE_V0;
use crate::fingerprint::{Canonicalizable, HashValue};
use crate::rule::{RuleId, RuleSet};
use crate::unify::{bindings_fingerprint, Bindings};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A fact produced by a completed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    pub rule: RuleId,
    pub rule_name: Option<String>,
    /// The `then` template with bindings substituted.
    pub fact: Value,
    pub bindings: Bindings,
}

/// What happened to one processed fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// At least one rule completed or one arc was created or extended.
    Matched,
    /// Nothing unified with the fact.
    Dropped,
    /// Dispatched to the plugin registered under `moniker`.
    Command { moniker: String },
    /// The control fact that empties the arc set.
    ClearArcs { cleared: usize },
}

/// One fact taken off the agenda.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Position in processing order, starting at 0.
    pub index: usize,
    /// The fact after variable resolution.
    pub fact: Value,
    pub kind: StepKind,
    pub productions: Vec<Production>,
    /// Facts returned by a plugin.
    pub emitted: Vec<Value>,
    /// Arcs registered while processing this fact.
    pub arcs_created: usize,
}

impl TraceStep {
    pub(crate) fn new(index: usize, fact: Value) -> Self {
        Self {
            index,
            fact,
            kind: StepKind::Dropped,
            productions: Vec::new(),
            emitted: Vec::new(),
            arcs_created: 0,
        }
    }
}

/// Error type for trace persistence and verification.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace encoding failed: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("trace file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("trace was produced under rule set {recorded}, not {actual}")]
    RuleSetMismatch { recorded: HashValue, actual: HashValue },
}

/// Record of one engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTrace {
    rule_set: HashValue,
    input: Value,
    steps: Vec<TraceStep>,
}

impl RunTrace {
    /// Starts a trace for `input` under the rule set with fingerprint `rule_set`.
    pub fn new(rule_set: HashValue, input: Value) -> Self {
        Self {
            rule_set,
            input,
            steps: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    /// The value passed to `run_assert`.
    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn rule_set_fingerprint(&self) -> HashValue {
        self.rule_set
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Facts in the order they were processed.
    pub fn facts(&self) -> impl Iterator<Item = &Value> {
        self.steps.iter().map(|s| &s.fact)
    }

    /// All productions in the order they were appended to the agenda.
    pub fn productions(&self) -> impl Iterator<Item = &Production> {
        self.steps.iter().flat_map(|s| s.productions.iter())
    }

    /// Steps that matched nothing.
    pub fn dropped(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter().filter(|s| s.kind == StepKind::Dropped)
    }

    /// Fails unless the trace was produced under `rules`.
    pub fn verify_rules(&self, rules: &RuleSet) -> Result<(), TraceError> {
        let actual = rules.fingerprint();
        if actual == self.rule_set {
            Ok(())
        } else {
            Err(TraceError::RuleSetMismatch {
                recorded: self.rule_set,
                actual,
            })
        }
    }

    /// Deterministic hash over the rule set, input, and every step.
    pub fn fingerprint(&self) -> HashValue {
        let mut data = Vec::new();
        data.extend_from_slice(self.rule_set.as_bytes());
        self.input.write_canonical_bytes(&mut data);
        data.extend_from_slice(&(self.steps.len() as u64).to_le_bytes());
        for step in &self.steps {
            step.fact.write_canonical_bytes(&mut data);
            data.push(match step.kind {
                StepKind::Matched => 0,
                StepKind::Dropped => 1,
                StepKind::Command { .. } => 2,
                StepKind::ClearArcs { .. } => 3,
            });
            data.extend_from_slice(&(step.productions.len() as u64).to_le_bytes());
            for production in &step.productions {
                data.extend_from_slice(&(production.rule.0 as u64).to_le_bytes());
                production.fact.write_canonical_bytes(&mut data);
                data.extend_from_slice(bindings_fingerprint(&production.bindings).as_bytes());
            }
            data.extend_from_slice(&(step.emitted.len() as u64).to_le_bytes());
            for fact in &step.emitted {
                fact.write_canonical_bytes(&mut data);
            }
        }
        HashValue::hash_with_domain(DOMAIN_RUN_TRACE_V0, &data)
    }

    /// Serializes the trace to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, TraceError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    /// Deserializes a trace from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, TraceError> {
        Ok(serde_cbor::from_slice(bytes)?)
    }

    /// Saves the trace to a file in CBOR format.
    pub fn save_to_file(&self, path: &Path) -> Result<(), TraceError> {
        let bytes = self.to_cbor()?;
        std::fs::write(path, bytes).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads a trace saved by [`RunTrace::save_to_file`].
    pub fn load_from_file(path: &Path) -> Result<Self, TraceError> {
        let bytes = std::fs::read(path).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_cbor(&bytes)
    }
}
