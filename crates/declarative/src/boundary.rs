//! Command boundary contract.
//!
//! Units never produce effects directly; every effect is a named command plus
//! an options mapping handed to a [`CommandBoundary`]. The host decides what a
//! command means (a subprocess, an HTTP call, a storage write).
//!
//! # Testing
//!
//! Use [`MockBoundary`] to record dispatches and script failures:
//!
//! ```
//! use declarative::boundary::{CommandBoundary, CommandResult, MockBoundary};
//! use serde_json::{Map, json};
//!
//! let mock = MockBoundary::new();
//! mock.respond("config save", json!({"saved": true}));
//!
//! let result = mock.exec("config save", &Map::new()).unwrap();
//! assert!(result.success);
//! assert_eq!(mock.commands(), vec!["config save"]);
//! ```

use crate::types::Declaration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Result of one command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,
    /// Named data returned by the command.
    #[serde(default)]
    pub data: Value,
    /// Error messages, forwarded unmodified into dispatch errors.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl CommandResult {
    /// A successful result carrying data.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            errors: Vec::new(),
        }
    }

    /// A failed result.
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            errors,
        }
    }
}

/// Executes named commands on behalf of units.
///
/// Implementations must be idempotent for `save`-style commands (upserts) and
/// succeed on `remove`-style commands carrying `force: true` when the target is
/// already absent.
pub trait CommandBoundary: Send + Sync {
    /// Execute a command.
    ///
    /// `Err` means the command could not be issued at all; a command that ran
    /// and failed returns `Ok` with `success == false`.
    fn exec(&self, command: &str, options: &Declaration) -> anyhow::Result<CommandResult>;
}

/// Recording boundary for tests.
///
/// Clones share the same call log, so a test can keep one handle while the
/// orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBoundary {
    calls: Arc<Mutex<Vec<(String, Declaration)>>>,
    responses: Arc<Mutex<HashMap<String, Value>>>,
    failures: Arc<Mutex<HashSet<String>>>,
}

impl MockBoundary {
    /// Create a boundary that succeeds on every command with null data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `data` for every call to `command`.
    pub fn respond(&self, command: impl Into<String>, data: Value) {
        lock(&self.responses).insert(command.into(), data);
    }

    /// Fail every call to `command`.
    pub fn fail_on(&self, command: impl Into<String>) {
        lock(&self.failures).insert(command.into());
    }

    /// Every recorded call, in arrival order.
    pub fn calls(&self) -> Vec<(String, Declaration)> {
        lock(&self.calls).clone()
    }

    /// Command names of every recorded call, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|(c, _)| c.clone()).collect()
    }

    /// Options of every call to `command`.
    pub fn calls_for(&self, command: &str) -> Vec<Declaration> {
        lock(&self.calls)
            .iter()
            .filter(|(c, _)| c == command)
            .map(|(_, o)| o.clone())
            .collect()
    }

    /// Forget recorded calls (responses and failures are kept).
    pub fn clear(&self) {
        lock(&self.calls).clear();
    }
}

impl CommandBoundary for MockBoundary {
    fn exec(&self, command: &str, options: &Declaration) -> anyhow::Result<CommandResult> {
        lock(&self.calls).push((command.to_string(), options.clone()));

        if lock(&self.failures).contains(command) {
            return Ok(CommandResult::failed(vec![format!("mock failure for '{command}'")]));
        }

        let data = lock(&self.responses)
            .get(command)
            .cloned()
            .unwrap_or(Value::Null);
        Ok(CommandResult::ok(data))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mock_records_in_order() {
        let mock = MockBoundary::new();
        let opts = json!({"config_key": "a"}).as_object().cloned().unwrap();

        mock.exec("config save", &opts).unwrap();
        mock.exec("task", &Declaration::new()).unwrap();

        assert_eq!(mock.commands(), vec!["config save", "task"]);
        assert_eq!(mock.calls_for("config save"), vec![opts]);
    }

    #[test]
    fn test_mock_scripted_failure() {
        let mock = MockBoundary::new();
        mock.fail_on("group remove");

        let result = mock.exec("group remove", &Declaration::new()).unwrap();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);

        let ok = mock.exec("group save", &Declaration::new()).unwrap();
        assert!(ok.success);
    }

    #[test]
    fn test_clones_share_log() {
        let mock = MockBoundary::new();
        let handle = mock.clone();
        mock.exec("noop", &Declaration::new()).unwrap();
        assert_eq!(handle.calls().len(), 1);

        handle.clear();
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_result_decodes_partial_json() {
        let result: CommandResult = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(result.success);
        assert_eq!(result.data, Value::Null);
        assert!(result.errors.is_empty());
    }
}
