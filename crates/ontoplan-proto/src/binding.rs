//! Variable bindings returned by graph queries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value bound to a query variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum BindingValue {
    /// A graph node identifier.
    Node(String),
    /// A literal, including aggregate results such as counts.
    Literal(String),
    /// A node sequence produced by a path pattern.
    Path(Vec<String>),
}

impl BindingValue {
    /// String form of a node or literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BindingValue::Node(s) | BindingValue::Literal(s) => Some(s),
            BindingValue::Path(_) => None,
        }
    }

    /// Node sequence of a path binding.
    pub fn as_path(&self) -> Option<&[String]> {
        match self {
            BindingValue::Path(nodes) => Some(nodes),
            _ => None,
        }
    }

    /// Parse the value as a non-negative count.
    ///
    /// Accepts plain integers and integral floats (`"3"`, `" 3 "`, `"3.0"`).
    /// Floats outside the `u64` range are rejected rather than clamped.
    /// Returns `None` for anything else; callers decide on the fallback.
    pub fn as_count(&self) -> Option<u64> {
        let raw = self.as_str()?.trim();
        if let Ok(n) = raw.parse::<u64>() {
            return Some(n);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 => Some(f as u64),
            _ => None,
        }
    }

    /// Raw text for diagnostics.
    pub fn raw(&self) -> String {
        match self {
            BindingValue::Node(s) | BindingValue::Literal(s) => s.clone(),
            BindingValue::Path(nodes) => nodes.join(" -> "),
        }
    }
}

/// A single result row: variable name to bound value.
pub type Binding = BTreeMap<String, BindingValue>;

/// Look up a variable as a string.
pub fn binding_str<'a>(binding: &'a Binding, var: &str) -> Option<&'a str> {
    binding.get(var).and_then(BindingValue::as_str)
}
