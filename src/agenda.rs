//! FIFO agenda of facts awaiting processing.
//!
//! Productions are appended at the back, so facts are processed breadth
//! first: everything derived from a fact waits until every fact queued
//! before it has been processed.

use crate::value::Value;
use std::collections::VecDeque;

/// Queue of pending facts for one run.
#[derive(Debug, Clone, Default)]
pub struct Agenda {
    queue: VecDeque<Value>,
}

impl Agenda {
    /// Creates an empty agenda.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fact at the back.
    pub fn push(&mut self, fact: Value) {
        self.queue.push_back(fact);
    }

    /// Appends facts at the back, keeping their order.
    pub fn extend<I>(&mut self, facts: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.queue.extend(facts);
    }

    /// Takes the oldest pending fact.
    pub fn pop(&mut self) -> Option<Value> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_insertion_order() {
        let mut agenda = Agenda::new();
        agenda.push(Value::text("a"));
        agenda.extend([Value::text("b"), Value::text("c")]);
        assert_eq!(agenda.len(), 3);
        let popped: Vec<_> = std::iter::from_fn(|| agenda.pop()).collect();
        assert_eq!(popped, vec![Value::text("a"), Value::text("b"), Value::text("c")]);
        assert!(agenda.is_empty());
    }
}
