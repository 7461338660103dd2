//! Unit context and provider traits
//!
//! Units receive a [`UnitContext`] for the instance they are processing. It is
//! the only door to the outside world: interpolation, runtime variables, named
//! locks and the command boundary all go through it, so display-only runs and
//! the dispatch journal cannot be bypassed.

use crate::boundary::{CommandBoundary, CommandResult};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::types::{Declaration, DispatchRecord, OrderKey, Outcome};
use interpolate::{Context, Interpolator, VariableStore};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Progress callback for orchestrator runs
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when a unit type starts
    fn on_bucket_start(&mut self, unit: &str, count: usize);

    /// Called when an instance has been ensured or destroyed
    fn on_instance_complete(&mut self, unit: &str, instance: &str, result: &Result<Outcome>);

    /// Called when a unit type completes
    fn on_bucket_complete(&mut self, unit: &str);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_bucket_start(&mut self, _unit: &str, _count: usize) {}
    fn on_instance_complete(&mut self, _unit: &str, _instance: &str, _result: &Result<Outcome>) {}
    fn on_bucket_complete(&mut self, _unit: &str) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Services shared by every instance of one orchestrator run.
pub struct Runtime<'a> {
    boundary: &'a dyn CommandBoundary,
    variables: &'a VariableStore,
    interpolator: &'a Interpolator,
    executor: &'a Executor,
    display_only: bool,
    lock_timeout: Duration,
    journal: Mutex<Vec<DispatchRecord>>,
}

impl<'a> Runtime<'a> {
    /// Create a runtime for one run
    pub fn new(
        boundary: &'a dyn CommandBoundary,
        variables: &'a VariableStore,
        interpolator: &'a Interpolator,
        executor: &'a Executor,
    ) -> Self {
        Self {
            boundary,
            variables,
            interpolator,
            executor,
            display_only: false,
            lock_timeout: Duration::from_secs(600),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Journal dispatches without calling the boundary
    #[must_use]
    pub fn display_only(mut self, display_only: bool) -> Self {
        self.display_only = display_only;
        self
    }

    /// Timeout for named locks
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Runtime variable store
    pub fn variables(&self) -> &VariableStore {
        self.variables
    }

    /// Interpolation context over runtime variables only
    pub fn interpolation_context(&self) -> Context<'_> {
        Context::new(self.variables)
    }

    /// Interpolation engine
    pub fn interpolator(&self) -> &Interpolator {
        self.interpolator
    }

    /// Journalled dispatches in run order
    pub fn dispatches(&self) -> Vec<DispatchRecord> {
        let mut records = self.journal().clone();
        records.sort_by_key(|r| r.order);
        records
    }

    fn journal(&self) -> MutexGuard<'_, Vec<DispatchRecord>> {
        match self.journal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Context for one unit instance
pub struct UnitContext<'a> {
    runtime: &'a Runtime<'a>,
    unit: &'a str,
    instance: &'a str,
    order: OrderKey,
    seq: AtomicUsize,
}

impl<'a> UnitContext<'a> {
    /// Create a context for one instance
    pub fn new(
        runtime: &'a Runtime<'a>,
        unit: &'a str,
        instance: &'a str,
        bucket: usize,
        index: usize,
    ) -> Self {
        Self {
            runtime,
            unit,
            instance,
            order: OrderKey {
                bucket,
                instance: index,
                seq: 0,
            },
            seq: AtomicUsize::new(0),
        }
    }

    /// Unit type name
    pub fn unit(&self) -> &str {
        self.unit
    }

    /// Instance name
    pub fn instance(&self) -> &str {
        self.instance
    }

    /// Whether dispatches are previewed only
    pub fn is_display_only(&self) -> bool {
        self.runtime.display_only
    }

    /// Runtime variable store
    pub fn variables(&self) -> &VariableStore {
        self.runtime.variables
    }

    /// Build a declaration error for this instance
    pub fn declaration_error(&self, directive: &str, message: impl Into<String>) -> Error {
        Error::declaration(self.unit, self.instance, directive, message)
    }

    /// Interpolate a value, with optional locals shadowing runtime variables
    pub fn interpolate(&self, value: &Value, locals: Option<&Declaration>) -> Result<Value> {
        let mut ctx = Context::new(self.runtime.variables);
        if let Some(locals) = locals {
            ctx = ctx.with_locals(locals);
        }
        self.runtime
            .interpolator
            .interpolate(value, &ctx)
            .map_err(|source| Error::Resolution {
                unit: self.unit.to_string(),
                instance: self.instance.to_string(),
                source,
            })
    }

    /// Interpolate a directive value; failures name the directive
    pub fn interpolate_directive(
        &self,
        key: &str,
        value: &Value,
        locals: Option<&Declaration>,
    ) -> Result<Value> {
        self.interpolate(value, locals).map_err(|e| match e {
            Error::Resolution {
                unit,
                instance,
                source,
            } => Error::Resolution {
                unit,
                instance,
                source: source.at(key),
            },
            other => other,
        })
    }

    /// Interpolate a directive that must produce text
    pub fn directive_text(
        &self,
        key: &str,
        value: &Value,
        locals: Option<&Declaration>,
    ) -> Result<String> {
        match self.interpolate_directive(key, value, locals)? {
            Value::String(text) if !text.is_empty() => Ok(text),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(self.declaration_error(key, format!("expected a non-empty string, got {other}"))),
        }
    }

    /// Interpolate a mapping payload
    pub fn interpolate_map(
        &self,
        payload: &Declaration,
        locals: Option<&Declaration>,
    ) -> Result<Declaration> {
        match self.interpolate(&Value::Object(payload.clone()), locals)? {
            Value::Object(map) => Ok(map),
            other => Err(self.declaration_error("", format!("payload resolved to non-mapping {other}"))),
        }
    }

    /// Issue a command across the boundary.
    ///
    /// In display-only mode the command is journalled and a successful empty
    /// result is returned without calling the boundary.
    pub fn exec(&self, command: &str, options: Declaration) -> Result<CommandResult> {
        let order = OrderKey {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            ..self.order
        };

        if self.runtime.display_only {
            log::info!("[display-only] {} {} -> {}", self.unit, self.instance, command);
            self.record(order, command, options, true);
            return Ok(CommandResult::ok(Value::Null));
        }

        log::debug!("Dispatching {} for {} '{}'", command, self.unit, self.instance);
        let result = self.runtime.boundary.exec(command, &options);
        let dispatch_error = |errors| Error::Dispatch {
            unit: self.unit.to_string(),
            instance: self.instance.to_string(),
            command: command.to_string(),
            errors,
        };

        match result {
            Ok(result) if result.success => {
                self.record(order, command, options, true);
                Ok(result)
            }
            Ok(result) => {
                self.record(order, command, options, false);
                Err(dispatch_error(result.errors))
            }
            Err(e) => {
                self.record(order, command, options, false);
                Err(dispatch_error(vec![format!("{e:#}")]))
            }
        }
    }

    /// Run `f` under a named cross-process lock
    pub fn run_exclusive<R>(&self, name: &str, f: impl FnOnce() -> Result<R>) -> Result<R> {
        if self.runtime.display_only {
            return f();
        }
        self.runtime
            .executor
            .run_exclusive(name, self.runtime.lock_timeout, f)
    }

    fn record(&self, order: OrderKey, command: &str, options: Declaration, success: bool) {
        self.runtime.journal().push(DispatchRecord {
            order,
            unit: self.unit.to_string(),
            instance: self.instance.to_string(),
            command: command.to_string(),
            options,
            success,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::MockBoundary;
    use serde_json::json;

    struct Fixture {
        boundary: MockBoundary,
        variables: VariableStore,
        interpolator: Interpolator,
        executor: Executor,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                boundary: MockBoundary::new(),
                variables: VariableStore::with_values([("env", json!("prod"))]),
                interpolator: Interpolator::standard(),
                executor: Executor::new(1),
            }
        }

        fn runtime(&self) -> Runtime<'_> {
            Runtime::new(&self.boundary, &self.variables, &self.interpolator, &self.executor)
        }
    }

    #[test]
    fn test_exec_records_and_dispatches() {
        let fx = Fixture::new();
        let runtime = fx.runtime();
        let ctx = UnitContext::new(&runtime, "run", "job", 2, 1);

        ctx.exec("noop", Declaration::new()).unwrap();
        ctx.exec("noop", Declaration::new()).unwrap();

        let records = runtime.dispatches();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].order, OrderKey { bucket: 2, instance: 1, seq: 1 });
        assert_eq!(fx.boundary.commands(), vec!["noop", "noop"]);
    }

    #[test]
    fn test_display_only_skips_boundary() {
        let fx = Fixture::new();
        let runtime = fx.runtime().display_only(true);
        let ctx = UnitContext::new(&runtime, "config", "a", 0, 0);

        let result = ctx.exec("config save", Declaration::new()).unwrap();
        assert!(result.success);
        assert!(fx.boundary.calls().is_empty());
        assert_eq!(runtime.dispatches().len(), 1);
    }

    #[test]
    fn test_failed_command_is_dispatch_error() {
        let fx = Fixture::new();
        fx.boundary.fail_on("role save");
        let runtime = fx.runtime();
        let ctx = UnitContext::new(&runtime, "role", "admin", 0, 0);

        let err = ctx.exec("role save", Declaration::new()).unwrap_err();
        assert!(matches!(err, Error::Dispatch { ref command, .. } if command == "role save"));
        assert!(!runtime.dispatches()[0].success);
    }

    #[test]
    fn test_interpolate_with_locals() {
        let fx = Fixture::new();
        let runtime = fx.runtime();
        let ctx = UnitContext::new(&runtime, "run", "job", 0, 0);
        let locals = json!({"region": "eu"}).as_object().cloned().unwrap();

        let value = ctx
            .interpolate(&json!("@{env}-@{region}"), Some(&locals))
            .unwrap();
        assert_eq!(value, json!("prod-eu"));
    }

    #[test]
    fn test_directive_resolution_error_names_directive() {
        let fx = Fixture::new();
        let runtime = fx.runtime();
        let ctx = UnitContext::new(&runtime, "run", "job", 0, 0);

        let err = ctx
            .directive_text("_command", &json!("@{missing_name}"), None)
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("missing_name"));
        assert!(text.contains("_command"));
        assert!(text.contains("run 'job'"));
    }
}
