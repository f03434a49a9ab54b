//! Plugin dispatch for command facts.
//!
//! A command is a fact whose head (its text, or the first key of a mapping)
//! is a registered moniker. Commands are handed to their plugin instead of
//! being matched against rules. Plugins may have side effects and may return
//! new facts, which the engine appends to the agenda.

use crate::constants::{EMIT_MONIKER, LOG_MONIKER, SET_MONIKER};
use crate::context::Context;
use crate::value::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Failure reported by a plugin. Fatal for the run that dispatched it.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("malformed command: {0}")]
    Malformed(String),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Capability exposed by an external handler.
pub trait Plugin: Send + Sync {
    /// Handles one command fact.
    ///
    /// `Ok(None)` and `Ok(Some(vec![]))` both mean "no new facts".
    fn process(&self, fact: &Value, context: &mut Context) -> Result<Option<Vec<Value>>, PluginError>;
}

/// Adapts a closure into a [`Plugin`].
pub struct FnPlugin<F>(pub F);

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&Value, &mut Context) -> Result<Option<Vec<Value>>, PluginError> + Send + Sync,
{
    fn process(&self, fact: &Value, context: &mut Context) -> Result<Option<Vec<Value>>, PluginError> {
        (self.0)(fact, context)
    }
}

/// Monikers mapped to their handlers.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with `#log`, `#set` and `#emit`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LOG_MONIKER, LogPlugin);
        registry.register(SET_MONIKER, SetPlugin);
        registry.register(EMIT_MONIKER, EmitPlugin);
        registry
    }

    /// Registers `plugin` under `moniker`, replacing any previous handler.
    pub fn register(&mut self, moniker: impl Into<String>, plugin: impl Plugin + 'static) {
        self.plugins.insert(moniker.into(), Box::new(plugin));
    }

    /// Registers a closure under `moniker`.
    pub fn register_fn<F>(&mut self, moniker: impl Into<String>, f: F)
    where
        F: Fn(&Value, &mut Context) -> Result<Option<Vec<Value>>, PluginError> + Send + Sync + 'static,
    {
        self.register(moniker, FnPlugin(f));
    }

    /// Moniker of `fact` if it is a command for a registered plugin.
    pub fn moniker_of<'a>(&self, fact: &'a Value) -> Option<&'a str> {
        fact.head().filter(|head| self.plugins.contains_key(*head))
    }

    pub fn get(&self, moniker: &str) -> Option<&dyn Plugin> {
        self.plugins.get(moniker).map(Box::as_ref)
    }

    pub fn contains(&self, moniker: &str) -> bool {
        self.plugins.contains_key(moniker)
    }

    pub fn monikers(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.plugins.keys()).finish()
    }
}

/// `{"#log": payload}`: logs the payload at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPlugin;

impl Plugin for LogPlugin {
    fn process(&self, fact: &Value, _context: &mut Context) -> Result<Option<Vec<Value>>, PluginError> {
        match fact.head_payload() {
            Some(payload) => info!(target: "rulechain::log", "{payload}"),
            None => info!(target: "rulechain::log", "{fact}"),
        }
        Ok(None)
    }
}

/// `{"#set": {"name": value, ...}}`: stores each entry in the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetPlugin;

impl Plugin for SetPlugin {
    fn process(&self, fact: &Value, context: &mut Context) -> Result<Option<Vec<Value>>, PluginError> {
        let Some(Value::Mapping(entries)) = fact.head_payload() else {
            return Err(PluginError::Malformed(format!(
                "{SET_MONIKER} expects a mapping payload, got {fact}"
            )));
        };
        for (name, value) in entries {
            context.set(name.clone(), value.clone());
        }
        Ok(None)
    }
}

/// `{"#emit": fact}` or `{"#emit": [fact, ...]}`: asserts the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitPlugin;

impl Plugin for EmitPlugin {
    fn process(&self, fact: &Value, _context: &mut Context) -> Result<Option<Vec<Value>>, PluginError> {
        match fact.head_payload() {
            Some(Value::List(items)) => Ok(Some(items.clone())),
            Some(payload) => Ok(Some(vec![payload.clone()])),
            None => Err(PluginError::Malformed(format!(
                "{EMIT_MONIKER} expects a payload, got {fact}"
            ))),
        }
    }
}
