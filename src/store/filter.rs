//! Document predicates.
//!
//! A small query algebra evaluated against JSON documents. Keys are dotted paths
//! into nested objects (`"path.depth"`, `"path.0"`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Field equals value. `Eq(key, Null)` also matches a missing field.
    Eq(String, Value),
    /// Field is present and non-null.
    Exists(String),
    Not(Box<Filter>),
    /// Every clause matches. Empty matches everything.
    And(Vec<Filter>),
    /// At least one clause matches. Empty matches nothing.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(key.into(), value.into())
    }

    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn none() -> Self {
        Filter::Or(Vec::new())
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Eq(key, expected) => match lookup(doc, key) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            },
            Filter::Exists(key) => lookup(doc, key).map(|v| !v.is_null()).unwrap_or(false),
            Filter::Not(inner) => !inner.matches(doc),
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
        }
    }
}

/// Resolve a dotted key inside nested objects.
pub fn lookup<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(doc, |current, part| current.as_object()?.get(part))
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq(key, value) => write!(f, "{}={}", key, value),
            Filter::Exists(key) => write!(f, "exists({})", key),
            Filter::Not(inner) => write!(f, "not({})", inner),
            Filter::And(clauses) => write_joined(f, "and", clauses),
            Filter::Or(clauses) => write_joined(f, "or", clauses),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, op: &str, clauses: &[Filter]) -> fmt::Result {
    write!(f, "{}(", op)?;
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", clause)?;
    }
    f.write_str(")")
}
