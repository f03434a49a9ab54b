//! Rule records and the rule store.
//!
//! Rules are read from static configuration and never change during a run.
//! A rule's `when` is either a single pattern or an ordered sequence of
//! constituent patterns; its `then` is a production template. Records that
//! cannot be matched (no `when`, or an empty sequence) are kept as inert
//! rules so rule ids stay aligned with declaration order.

use crate::constants::{DOMAIN_RULE_SET_V0, DOMAIN_RULE_V0};
use crate::fingerprint::{write_str, Canonicalizable, HashValue};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Index of a rule in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub usize);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// The matching side of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum When {
    /// Matched directly against each fact; never creates arcs.
    Single(Value),
    /// Constituents matched by successive facts, tracked through arcs.
    Sequence(Vec<Value>),
}

impl When {
    /// Number of facts needed to complete the rule.
    pub fn len(&self) -> usize {
        match self {
            When::Single(_) => 1,
            When::Sequence(steps) => steps.len(),
        }
    }

    /// Always false for a constructed `When`; empty sequences are rejected at parse time.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pattern of the constituent at `position`.
    pub fn constituent(&self, position: usize) -> Option<&Value> {
        match self {
            When::Single(p) if position == 0 => Some(p),
            When::Single(_) => None,
            When::Sequence(steps) => steps.get(position),
        }
    }
}

/// A production rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    id: RuleId,
    name: Option<String>,
    when: Option<When>,
    then: Option<Value>,
}

impl Rule {
    /// A single-pattern rule.
    pub fn single(when: Value, then: Value) -> Self {
        Self {
            id: RuleId(0),
            name: None,
            when: Some(When::Single(when)),
            then: Some(then),
        }
    }

    /// A sequence rule; an empty `steps` yields an inert rule.
    pub fn sequence(steps: Vec<Value>, then: Value) -> Self {
        Self {
            id: RuleId(0),
            name: None,
            when: (!steps.is_empty()).then_some(When::Sequence(steps)),
            then: Some(then),
        }
    }

    /// Attaches a display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parses a `{ "name"?, "when"?, "then"? }` record.
    ///
    /// Anything other than a mapping, or a mapping without a usable `when`,
    /// becomes an inert rule.
    pub fn from_record(record: &Value) -> Self {
        let Value::Mapping(map) = record else {
            return Self {
                id: RuleId(0),
                name: None,
                when: None,
                then: None,
            };
        };
        let when = match map.get("when") {
            Some(Value::List(steps)) if steps.is_empty() => None,
            Some(Value::List(steps)) => Some(When::Sequence(steps.clone())),
            Some(pattern) => Some(When::Single(pattern.clone())),
            None => None,
        };
        Self {
            id: RuleId(0),
            name: map.get("name").and_then(Value::as_text).map(str::to_string),
            when,
            then: map.get("then").cloned(),
        }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn when(&self) -> Option<&When> {
        self.when.as_ref()
    }

    pub fn then(&self) -> Option<&Value> {
        self.then.as_ref()
    }

    /// True if the rule can never match.
    pub fn is_inert(&self) -> bool {
        self.when.is_none()
    }

    /// True for rules matched through arcs.
    pub fn is_sequence(&self) -> bool {
        matches!(self.when, Some(When::Sequence(_)))
    }

    /// Name if present, otherwise the id.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    /// Deterministic hash of the rule's content (the id is excluded).
    pub fn fingerprint(&self) -> HashValue {
        HashValue::hash_with_domain(DOMAIN_RULE_V0, &self.to_canonical_bytes())
    }
}

impl Canonicalizable for Rule {
    fn write_canonical_bytes(&self, buf: &mut Vec<u8>) {
        match &self.name {
            Some(name) => {
                buf.push(1);
                write_str(buf, name);
            }
            None => buf.push(0),
        }
        match &self.when {
            None => buf.push(0),
            Some(When::Single(p)) => {
                buf.push(1);
                p.write_canonical_bytes(buf);
            }
            Some(When::Sequence(steps)) => {
                buf.push(2);
                buf.extend_from_slice(&(steps.len() as u64).to_le_bytes());
                for step in steps {
                    step.write_canonical_bytes(buf);
                }
            }
        }
        match &self.then {
            Some(t) => {
                buf.push(1);
                t.write_canonical_bytes(buf);
            }
            None => buf.push(0),
        }
    }
}

/// Error type for loading rule sets.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON rules: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML rules: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("rules must be a list of rule records")]
    NotAList,
    #[error("unsupported rule file extension: {0:?}")]
    UnsupportedFormat(Option<String>),
}

/// Ordered store of rules. Matching visits rules in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule and assigns it the next id.
    pub fn push(&mut self, mut rule: Rule) -> RuleId {
        let id = RuleId(self.rules.len());
        rule.id = id;
        if rule.is_inert() {
            warn!(rule = %rule.label(), "rule has no usable `when`; it will never match");
        }
        self.rules.push(rule);
        id
    }

    /// Builds a rule set from a list of rule records.
    pub fn from_value(records: &Value) -> Result<Self, RuleError> {
        let Value::List(items) = records else {
            return Err(RuleError::NotAList);
        };
        let mut set = Self::new();
        for record in items {
            set.push(Rule::from_record(record));
        }
        debug!(rules = set.len(), "rule set loaded");
        Ok(set)
    }

    /// Parses a JSON array of rule records.
    pub fn from_json_str(s: &str) -> Result<Self, RuleError> {
        Self::from_value(&Value::from_json_str(s)?)
    }

    /// Parses TOML with `[[rule]]` (or `[[rules]]`) tables.
    pub fn from_toml_str(s: &str) -> Result<Self, RuleError> {
        let table: toml::Table = toml::from_str(s)?;
        let records = table
            .get("rule")
            .or_else(|| table.get("rules"))
            .ok_or(RuleError::NotAList)?;
        let json = serde_json::to_value(records)?;
        Self::from_value(&Value::from(json))
    }

    /// Loads a rule file, choosing the format by extension (`.json` or `.toml`).
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            _ => Err(RuleError::UnsupportedFormat(ext)),
        }
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Deterministic hash of the whole store; rule order matters.
    pub fn fingerprint(&self) -> HashValue {
        let mut data = Vec::with_capacity(8 + 32 * self.rules.len());
        data.extend_from_slice(&(self.rules.len() as u64).to_le_bytes());
        for rule in &self.rules {
            data.extend_from_slice(rule.fingerprint().as_bytes());
        }
        HashValue::hash_with_domain(DOMAIN_RULE_SET_V0, &data)
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = Self::new();
        for rule in iter {
            set.push(rule);
        }
        set
    }
}
