//! Shared variable store for one engine.
//!
//! Plugins read and write the context; before a fact is processed its
//! variable references are resolved against it.

use crate::value::Value;
use indexmap::IndexMap;

/// Named values visible to plugins and to fact resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    vars: IndexMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Replaces every variable in `fact` that names a context entry.
    ///
    /// Unknown variables are kept so they can still act as values.
    pub fn resolve(&self, fact: &Value) -> Value {
        if !fact.contains_vars() {
            return fact.clone();
        }
        fact.replace_vars(&|name| self.vars.get(name).cloned())
    }
}
