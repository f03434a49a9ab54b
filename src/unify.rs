//! One-way unification of patterns against facts.
//!
//! Patterns are subsets: a mapping pattern constrains only the keys it
//! names, and any extra keys in the fact are ignored. Variables occur only
//! on the pattern side; a variable inside a fact is an ordinary value.
//!
//! # Citations
//! - First-order unification: Robinson, "A machine-oriented logic based on the resolution principle" (1965)
//! - Pattern matching in production systems: Forgy, "OPS5 User's Manual" (1981)

use crate::constants::DOMAIN_BINDINGS_V0;
use crate::fingerprint::{write_str, Canonicalizable, HashValue};
use crate::value::Value;
use std::collections::{BTreeMap, VecDeque};

/// Variable name to bound value. Ordered so iteration and hashing are deterministic.
pub type Bindings = BTreeMap<String, Value>;

/// Unifies `pattern` with `fact` from empty bindings.
///
/// Returns `None` when they do not unify; that is an expected outcome, not an error.
pub fn unify(pattern: &Value, fact: &Value) -> Option<Bindings> {
    unify_with(pattern, fact, &Bindings::new())
}

/// Unifies `pattern` with `fact`, extending a copy of `seed`.
///
/// A variable already bound in `seed` must match the fact at its position.
/// `seed` itself is never modified.
pub fn unify_with(pattern: &Value, fact: &Value, seed: &Bindings) -> Option<Bindings> {
    let mut subst = seed.clone();
    let mut work: VecDeque<(&Value, &Value)> = VecDeque::new();
    work.push_back((pattern, fact));

    while let Some((p, f)) = work.pop_front() {
        match (p, f) {
            (Value::Var(name), f) => bind(name, f, &mut subst)?,

            (Value::Scalar(a), Value::Scalar(b)) => {
                if a != b {
                    return None;
                }
            }

            (Value::Mapping(pm), Value::Mapping(fm)) => {
                // Leftmost key first keeps binding order deterministic.
                for (key, sub) in pm.iter().rev() {
                    let fv = fm.get(key)?;
                    work.push_front((sub, fv));
                }
            }

            (Value::List(ps), Value::List(fs)) => {
                if ps.len() != fs.len() {
                    return None;
                }
                for (x, y) in ps.iter().zip(fs.iter()).rev() {
                    work.push_front((x, y));
                }
            }

            _ => return None,
        }
    }

    Some(subst)
}

/// Binds `name` to `value`, requiring agreement with an existing binding.
fn bind(name: &str, value: &Value, subst: &mut Bindings) -> Option<()> {
    match subst.get(name) {
        Some(existing) if existing != value => None,
        Some(_) => Some(()),
        None => {
            subst.insert(name.to_string(), value.clone());
            Some(())
        }
    }
}

/// Instantiates a template: bound variables are replaced, unbound ones stay.
pub fn substitute(template: &Value, bindings: &Bindings) -> Value {
    template.replace_vars(&|name| bindings.get(name).cloned())
}

/// Deterministic hash of a binding map.
pub fn bindings_fingerprint(bindings: &Bindings) -> HashValue {
    let mut data = Vec::new();
    data.extend_from_slice(&(bindings.len() as u64).to_le_bytes());
    for (name, value) in bindings {
        write_str(&mut data, name);
        value.write_canonical_bytes(&mut data);
    }
    HashValue::hash_with_domain(DOMAIN_BINDINGS_V0, &data)
}
