//! `run` unit: tasks and arbitrary commands, once per scope assignment.

use super::{options, require_any, scope_assignments, validate_mapping};
use crate::boundary::CommandResult;
use crate::component::Component;
use crate::context::UnitContext;
use crate::directive::Parsed;
use crate::error::{Error, Result};
use crate::types::{Declaration, Outcome};
use serde_json::{Value, json};

/// Module used for `_task` when `_module` is not given.
pub const DEFAULT_MODULE: &str = "core";

/// Dispatches `_task` / `_command` and captures results into `_config` variables.
///
/// Directives:
/// - `_task: name` with optional `_module` → `task {module_key, task_key, task_fields}`
/// - `_command: "words"` → `<words> options`
/// - `_config: var` → store the command's data (or the options) as runtime variable `var`
/// - `_lock: name` → hold a named lock around the dispatch
/// - `_destroy: "words"` → command issued on teardown
#[derive(Debug, Default)]
pub struct Run;

impl Run {
    fn run_options(ctx: &UnitContext<'_>, parsed: &Parsed, assignment: &Declaration) -> Result<Declaration> {
        let payload = ctx.interpolate_map(parsed.payload(), Some(assignment))?;
        let mut opts = assignment.clone();
        opts.extend(payload);
        Ok(opts)
    }

    fn dispatch(
        ctx: &UnitContext<'_>,
        parsed: &Parsed,
        assignment: &Declaration,
        opts: &Declaration,
    ) -> Result<Option<CommandResult>> {
        if let Some(task) = parsed.get("_task") {
            let task_key = ctx.directive_text("_task", task, Some(assignment))?;
            let module_key = match parsed.get("_module") {
                Some(module) => ctx.directive_text("_module", module, Some(assignment))?,
                None => DEFAULT_MODULE.to_string(),
            };
            let result = ctx.exec(
                "task",
                options([
                    ("module_key", json!(module_key)),
                    ("task_key", json!(task_key)),
                    ("task_fields", Value::Object(opts.clone())),
                ]),
            )?;
            return Ok(Some(result));
        }

        if let Some(command) = parsed.get("_command") {
            let command = ctx.directive_text("_command", command, Some(assignment))?;
            return ctx.exec(&command, opts.clone()).map(Some);
        }

        Ok(None)
    }

    fn locked<R>(
        ctx: &UnitContext<'_>,
        parsed: &Parsed,
        assignment: &Declaration,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        match parsed.get("_lock") {
            Some(lock) => {
                let name = ctx.directive_text("_lock", lock, Some(assignment))?;
                ctx.run_exclusive(&name, f)
            }
            None => f(),
        }
    }
}

impl Component for Run {
    fn name(&self) -> &'static str {
        "run"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn skip_describe(&self) -> bool {
        true
    }

    fn validate(&self, instance: &str, declaration: &Value) -> Result<()> {
        let parsed = validate_mapping(self.name(), instance, declaration)?;
        if parsed.has("_task") && parsed.has("_command") {
            return Err(Error::declaration(
                self.name(),
                instance,
                "_task|_command",
                "declares both _task and _command; pick one",
            ));
        }
        require_any(self.name(), instance, &parsed, &["_task", "_command", "_config"])
    }

    fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let parsed = Parsed::from_value(declaration);
        let mut outcome = Outcome::NoChange;

        for assignment in scope_assignments(ctx, &parsed)? {
            let opts = Self::run_options(ctx, &parsed, &assignment)?;
            let result = Self::locked(ctx, &parsed, &assignment, || {
                Self::dispatch(ctx, &parsed, &assignment, &opts)
            })?;

            if result.is_some() {
                outcome = Outcome::Applied;
            }

            if let Some(var) = parsed.get("_config") {
                let var = ctx.directive_text("_config", var, Some(&assignment))?;
                let value = match result {
                    Some(result) if !result.data.is_null() => result.data,
                    _ => Value::Object(opts),
                };
                log::debug!("Capturing {} '{}' into runtime variable '{}'", ctx.unit(), ctx.instance(), var);
                ctx.variables().set(var, value);
                outcome = Outcome::Applied;
            }
        }

        Ok(outcome)
    }

    fn destroy(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let parsed = Parsed::from_value(declaration);
        let Some(teardown) = parsed.get("_destroy") else {
            return Ok(Outcome::skipped("no _destroy command declared"));
        };

        let mut outcome = Outcome::NoChange;
        for assignment in scope_assignments(ctx, &parsed)? {
            let command = ctx.directive_text("_destroy", teardown, Some(&assignment))?;
            let opts = Self::run_options(ctx, &parsed, &assignment)?;
            Self::locked(ctx, &parsed, &assignment, || ctx.exec(&command, opts))?;

            if let Some(var) = parsed.get("_config") {
                let var = ctx.directive_text("_config", var, Some(&assignment))?;
                ctx.variables().remove(&var);
            }
            outcome = Outcome::Removed;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::Harness;

    #[test]
    fn test_validate_requires_action() {
        let err = Run.validate("job", &json!({"x": 1})).unwrap_err();
        assert!(matches!(err, Error::Declaration { .. }));
        assert!(err.to_string().contains("_task"));

        assert!(Run.validate("job", &json!({"_command": "noop"})).is_ok());
        assert!(Run.validate("job", &json!({"_config": "out"})).is_ok());
    }

    #[test]
    fn test_validate_rejects_task_and_command() {
        let err = Run
            .validate("job", &json!({"_task": "migrate", "_command": "noop"}))
            .unwrap_err();
        assert!(matches!(err, Error::Declaration { .. }));
        assert!(err.to_string().contains("both _task and _command"), "{err}");
    }

    #[test]
    fn test_command_once_per_scope() {
        let h = Harness::new();
        let decl = json!({"_command": "noop", "_scopes": {"env": ["dev", "prod"]}});

        h.ensure(&Run, "job1", &decl).unwrap();

        let calls = h.boundary.calls_for("noop");
        assert_eq!(calls, vec![options([("env", json!("dev"))]), options([("env", json!("prod"))])]);
    }

    #[test]
    fn test_payload_overrides_scope() {
        let h = Harness::new();
        let decl = json!({"_command": "deploy", "_scopes": {"env": ["dev"]}, "env": "staging", "tag": "@{env}-1"});

        h.ensure(&Run, "job", &decl).unwrap();
        assert_eq!(
            h.boundary.calls_for("deploy"),
            vec![options([("env", json!("staging")), ("tag", json!("dev-1"))])]
        );
    }

    #[test]
    fn test_task_dispatch() {
        let h = Harness::new();
        let decl = json!({"_task": "backup", "_module": "db", "target": "s3"});

        h.ensure(&Run, "nightly", &decl).unwrap();
        assert_eq!(
            h.boundary.calls_for("task"),
            vec![options([
                ("module_key", json!("db")),
                ("task_key", json!("backup")),
                ("task_fields", json!({"target": "s3"})),
            ])]
        );

        h.boundary.clear();
        h.ensure(&Run, "nightly", &json!({"_task": "backup"})).unwrap();
        assert_eq!(h.boundary.calls_for("task")[0]["module_key"], json!(DEFAULT_MODULE));
    }

    #[test]
    fn test_config_captures_result_data() {
        let h = Harness::new();
        h.boundary.respond("lookup ip", json!({"ip": "10.0.0.5"}));

        h.ensure(&Run, "ip", &json!({"_command": "lookup ip", "_config": "web_ip"}))
            .unwrap();
        assert_eq!(h.variables.get("web_ip"), Some(json!({"ip": "10.0.0.5"})));
    }

    #[test]
    fn test_config_without_dispatch_stores_options() {
        let h = Harness::new();
        h.ensure(&Run, "s", &json!({"_config": "settings", "a": 1})).unwrap();
        assert_eq!(h.variables.get("settings"), Some(json!({"a": 1})));
        assert!(h.boundary.calls().is_empty());
    }

    #[test]
    fn test_lock_wraps_dispatch() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut h = Harness::new();
        h.executor = h.executor.clone().with_lock_dir(dir.path());

        h.ensure(&Run, "init", &json!({"_command": "module init", "_lock": "init-@{name}", "name": "x"}))
            .unwrap_err();

        h.variables.set("name", json!("core"));
        h.ensure(&Run, "init", &json!({"_command": "module init", "_lock": "init-@{name}"}))
            .unwrap();
        assert!(dir.path().join("init-core.lock").exists());
    }

    #[test]
    fn test_destroy_without_teardown_is_skipped() {
        let h = Harness::new();
        let outcome = h.destroy(&Run, "job", &json!({"_command": "noop"})).unwrap();
        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert!(h.boundary.calls().is_empty());
    }

    #[test]
    fn test_destroy_with_teardown() {
        let h = Harness::new();
        h.variables.set("out", json!(1));
        let decl = json!({"_command": "up", "_destroy": "down", "_config": "out", "_scopes": {"n": [1, 2]}});

        let outcome = h.destroy(&Run, "job", &decl).unwrap();
        assert_eq!(outcome, Outcome::Removed);
        assert_eq!(h.boundary.calls_for("down").len(), 2);
        assert!(!h.variables.contains("out"));
    }

    #[test]
    fn test_unresolved_command_reference() {
        let h = Harness::new();
        let err = h
            .ensure(&Run, "job", &json!({"_command": "@{missing_name}"}))
            .unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
        assert!(err.to_string().contains("missing_name"));
        assert!(h.boundary.calls().is_empty());
    }
}
