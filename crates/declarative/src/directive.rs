//! Directive extraction.
//!
//! A declaration mixes directive keys (prefixed with `_`) with payload keys.
//! Extraction never mutates the input: each helper returns the extracted
//! values alongside a new payload mapping, so instances that share a parent
//! declaration cannot see each other's edits.

use crate::types::Declaration;
use serde_json::Value;

/// Prefix marking directive keys.
pub const DIRECTIVE_PREFIX: &str = "_";

/// Check whether a key is a directive.
pub fn is_directive(key: &str) -> bool {
    key.starts_with(DIRECTIVE_PREFIX)
}

/// Extract one key, returning its value and the remaining mapping.
pub fn pop(key: &str, declaration: &Declaration) -> (Option<Value>, Declaration) {
    let mut value = None;
    let mut rest = Declaration::new();
    for (k, v) in declaration {
        if k == key {
            value = Some(v.clone());
        } else {
            rest.insert(k.clone(), v.clone());
        }
    }
    (value, rest)
}

/// Extract every key starting with `prefix`, returning them and the remaining mapping.
pub fn pop_many(prefix: &str, declaration: &Declaration) -> (Declaration, Declaration) {
    let mut popped = Declaration::new();
    let mut rest = Declaration::new();
    for (k, v) in declaration {
        if k.starts_with(prefix) {
            popped.insert(k.clone(), v.clone());
        } else {
            rest.insert(k.clone(), v.clone());
        }
    }
    (popped, rest)
}

/// A declaration split into directives and payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parsed {
    directives: Declaration,
    payload: Declaration,
}

impl Parsed {
    /// Split a mapping declaration.
    pub fn new(declaration: &Declaration) -> Self {
        let (directives, payload) = pop_many(DIRECTIVE_PREFIX, declaration);
        Self {
            directives,
            payload,
        }
    }

    /// Split any declaration; non-mapping values yield an empty split.
    pub fn from_value(declaration: &Value) -> Self {
        match declaration {
            Value::Object(map) => Self::new(map),
            _ => Self::default(),
        }
    }

    /// Directive value, if present and not null.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.directives.get(key).filter(|v| !v.is_null())
    }

    /// Whether a directive is present.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All directives.
    pub fn directives(&self) -> &Declaration {
        &self.directives
    }

    /// Payload with directives removed.
    pub fn payload(&self) -> &Declaration {
        &self.payload
    }

    /// Copy of this split with `key` set when the original lacks it.
    pub fn inherit(&self, key: &str, parent: &Self) -> Self {
        let mut merged = self.clone();
        if !merged.has(key)
            && let Some(value) = parent.get(key)
        {
            merged.directives.insert(key.to_string(), value.clone());
        }
        merged
    }
}
