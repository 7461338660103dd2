//! Scope combination expansion.
//!
//! A scope spec maps dimension names to candidate values. Expansion yields the
//! cartesian product as a list of assignments, outer dimension major, in the
//! insertion order of dimensions and values.

use crate::types::Declaration;
use serde_json::Value;

/// A scope spec that cannot be expanded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dimension '{dimension}': {message}")]
pub struct MalformedScope {
    /// Dimension at fault (empty when the spec itself is not a mapping).
    pub dimension: String,
    /// What is wrong.
    pub message: String,
}

/// Expand a scope spec into assignments.
///
/// A scalar dimension value counts as a single candidate. A spec with no
/// dimensions yields one empty assignment; any empty candidate list yields
/// no assignments at all.
pub fn expand(spec: &Declaration) -> Result<Vec<Declaration>, MalformedScope> {
    cardinality(spec)?;
    let mut dimensions: Vec<(&str, Vec<Value>)> = Vec::with_capacity(spec.len());
    for (name, candidates) in spec {
        dimensions.push((name, candidates_of(name, candidates)?));
    }

    let mut assignments = vec![Declaration::new()];
    for (name, candidates) in &dimensions {
        let mut next = Vec::with_capacity(assignments.len() * candidates.len());
        for partial in &assignments {
            for candidate in candidates {
                let mut assignment = partial.clone();
                assignment.insert((*name).to_string(), candidate.clone());
                next.push(assignment);
            }
        }
        assignments = next;
    }

    Ok(assignments)
}

/// Expand an optional `_scopes` directive value.
///
/// `None` or null means "unscoped": a single empty assignment.
pub fn expand_value(spec: Option<&Value>) -> Result<Vec<Declaration>, MalformedScope> {
    match spec {
        None | Some(Value::Null) => Ok(vec![Declaration::new()]),
        Some(Value::Object(map)) => expand(map),
        Some(other) => Err(MalformedScope {
            dimension: String::new(),
            message: format!("scope spec must be a mapping, got {other}"),
        }),
    }
}

/// Number of assignments a spec expands to, without building them.
pub fn cardinality(spec: &Declaration) -> Result<usize, MalformedScope> {
    spec.iter().try_fold(1usize, |total, (name, candidates)| {
        total
            .checked_mul(candidates_of(name, candidates)?.len())
            .ok_or_else(|| MalformedScope {
                dimension: name.to_string(),
                message: "too many combinations".to_string(),
            })
    })
}

fn candidates_of(name: &str, value: &Value) -> Result<Vec<Value>, MalformedScope> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(vec![value.clone()]),
        Value::Null | Value::Object(_) => Err(MalformedScope {
            dimension: name.to_string(),
            message: "candidates must be a list or a scalar".to_string(),
        }),
    }
}
