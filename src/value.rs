//! Fact and pattern values.
//!
//! A single tagged type serves as fact, pattern and production template.
//! Facts never carry meaning in their variables; patterns and templates use
//! `Var` as a metavariable. The JSON-compatible surface format spells a
//! variable as a text value prefixed with `$`.

use crate::constants::{DOMAIN_VALUE_V0, VARIABLE_SIGIL};
use crate::fingerprint::{write_str, Canonicalizable, HashValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Atomic value.
///
/// Numbers compare by value: an integral float equals the integer it holds.
#[derive(Debug, Clone, Eq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Number(a), Scalar::Number(b)) => canonical_number(a) == canonical_number(b),
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            _ => false,
        }
    }
}

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Decimal form used for number equality and hashing. Integral floats are
/// written as integers, so `1.0` and `1` agree.
fn canonical_number(n: &Number) -> String {
    if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
        if f.fract() == 0.0 && f.abs() <= MAX_EXACT_F64_INT {
            return (f as i64).to_string();
        }
    }
    n.to_string()
}

/// A fact, pattern or template.
///
/// Mapping equality ignores key order; iteration keeps insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Scalar(Scalar),
    Mapping(IndexMap<String, Value>),
    List(Vec<Value>),
    /// Variable reference, stored without its sigil.
    Var(String),
}

impl Value {
    /// The null scalar.
    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    /// A text scalar. No sigil interpretation happens here.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Text(s.into()))
    }

    /// A variable reference named `name` (without sigil).
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// A mapping built from `(key, value)` pairs in order.
    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A list of values.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Parses the JSON surface format, interpreting `$name` strings as variables.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(s).map(Self::from)
    }

    /// Returns the text if this is a text scalar.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns true for lists.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// The word that names a command or control fact: the text of a text
    /// scalar, or the first key of a mapping.
    pub fn head(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Text(s)) => Some(s),
            Self::Mapping(map) => map.keys().next().map(String::as_str),
            _ => None,
        }
    }

    /// Payload of a command fact: the first mapping value, or `None` for a
    /// bare text command.
    pub fn head_payload(&self) -> Option<&Value> {
        match self {
            Self::Mapping(map) => map.values().next(),
            _ => None,
        }
    }

    /// Returns true if any variable occurs in the value.
    pub fn contains_vars(&self) -> bool {
        match self {
            Self::Var(_) => true,
            Self::Scalar(_) => false,
            Self::Mapping(map) => map.values().any(Value::contains_vars),
            Self::List(items) => items.iter().any(Value::contains_vars),
        }
    }

    /// Collects variable names in first-occurrence order, without duplicates.
    pub fn var_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Scalar(_) => {}
            Self::Mapping(map) => map.values().for_each(|v| v.collect_vars(out)),
            Self::List(items) => items.iter().for_each(|v| v.collect_vars(out)),
        }
    }

    /// Rebuilds the value, replacing each variable for which `lookup`
    /// returns a value. Other variables are kept.
    pub fn replace_vars<F>(&self, lookup: &F) -> Value
    where
        F: Fn(&str) -> Option<Value>,
    {
        match self {
            Self::Var(name) => lookup(name).unwrap_or_else(|| self.clone()),
            Self::Scalar(_) => self.clone(),
            Self::Mapping(map) => Self::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.replace_vars(lookup)))
                    .collect(),
            ),
            Self::List(items) => Self::List(items.iter().map(|v| v.replace_vars(lookup)).collect()),
        }
    }

    /// Deterministic fingerprint; equal values hash equally.
    pub fn fingerprint(&self) -> HashValue {
        HashValue::hash_with_domain(DOMAIN_VALUE_V0, &self.to_canonical_bytes())
    }
}

impl Canonicalizable for Value {
    /// Tag byte per variant; mappings are written with sorted keys so the
    /// encoding agrees with order-insensitive equality.
    fn write_canonical_bytes(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Scalar(Scalar::Null) => buf.push(0),
            Self::Scalar(Scalar::Bool(b)) => {
                buf.push(1);
                buf.push(u8::from(*b));
            }
            Self::Scalar(Scalar::Number(n)) => {
                buf.push(2);
                write_str(buf, &canonical_number(n));
            }
            Self::Scalar(Scalar::Text(s)) => {
                buf.push(3);
                write_str(buf, s);
            }
            Self::Mapping(map) => {
                buf.push(4);
                buf.extend_from_slice(&(map.len() as u64).to_le_bytes());
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    write_str(buf, key);
                    map[key.as_str()].write_canonical_bytes(buf);
                }
            }
            Self::List(items) => {
                buf.push(5);
                buf.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.write_canonical_bytes(buf);
                }
            }
            Self::Var(name) => {
                buf.push(6);
                write_str(buf, name);
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::null(),
            serde_json::Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => Self::Scalar(Scalar::Number(n)),
            serde_json::Value::String(s) => {
                if let Some(name) = s.strip_prefix(VARIABLE_SIGIL).filter(|n| !n.is_empty()) {
                    return Self::Var(name.to_string());
                }
                Self::Scalar(Scalar::Text(s))
            }
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Mapping(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Scalar(Scalar::Null) => serde_json::Value::Null,
            Value::Scalar(Scalar::Bool(b)) => serde_json::Value::Bool(b),
            Value::Scalar(Scalar::Number(n)) => serde_json::Value::Number(n),
            Value::Scalar(Scalar::Text(s)) => serde_json::Value::String(s),
            Value::Var(name) => serde_json::Value::String(format!("{VARIABLE_SIGIL}{name}")),
            Value::List(items) => serde_json::Value::Array(items.into_iter().map(Into::into).collect()),
            Value::Mapping(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Scalar(Scalar::Number(n.into()))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json: serde_json::Value = self.clone().into();
        write!(f, "{json}")
    }
}
