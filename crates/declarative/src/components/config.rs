//! `config` unit: persisted configuration values that also seed runtime variables.

use super::options;
use crate::component::Component;
use crate::context::UnitContext;
use crate::error::{Error, Result};
use crate::types::Outcome;
use interpolate::escape;
use serde_json::{Value, json};

/// `config save {config_key, config_value, config_value_type}`, then `variables[instance] = value`.
#[derive(Debug, Default)]
pub struct Config;

/// Type tag sent alongside a config value.
pub fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

impl Component for Config {
    fn name(&self) -> &'static str {
        "config"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn can_parallelize(&self) -> bool {
        false
    }

    fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let value = ctx.interpolate(declaration, None)?;

        ctx.exec(
            "config save",
            options([
                ("config_key", json!(ctx.instance())),
                ("config_value", value.clone()),
                ("config_value_type", json!(value_type(&value))),
            ]),
        )?;
        ctx.variables().set(ctx.instance(), value);

        Ok(Outcome::Applied)
    }

    fn destroy(&self, ctx: &UnitContext<'_>, _declaration: &Value) -> Result<Outcome> {
        ctx.exec(
            "config remove",
            options([("config_key", json!(ctx.instance())), ("force", json!(true))]),
        )?;
        ctx.variables().remove(ctx.instance());

        Ok(Outcome::Removed)
    }

    fn describe(&self, instance: &Value) -> Result<Value> {
        instance
            .get("config_value")
            .map(escape)
            .ok_or_else(|| Error::declaration("config", "", "config_value", "live instance has no config_value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::Harness;

    #[test]
    fn test_ensure_saves_and_seeds() {
        let h = Harness::new();
        h.ensure(&Config, "a", &json!(1)).unwrap();

        assert_eq!(
            h.boundary.calls_for("config save"),
            vec![options([
                ("config_key", json!("a")),
                ("config_value", json!(1)),
                ("config_value_type", json!("int")),
            ])]
        );
        assert_eq!(h.variables.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let h = Harness::new();
        h.ensure(&Config, "hosts", &json!(["a", "b"])).unwrap();
        h.ensure(&Config, "hosts", &json!(["a", "b"])).unwrap();

        let calls = h.boundary.calls_for("config save");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }

    #[test]
    fn test_destroy_forces_remove() {
        let h = Harness::new();
        h.variables.set("a", json!(1));
        h.destroy(&Config, "a", &json!(1)).unwrap();

        assert_eq!(
            h.boundary.calls_for("config remove"),
            vec![options([("config_key", json!("a")), ("force", json!(true))])]
        );
        assert!(!h.variables.contains("a"));
    }

    #[test]
    fn test_describe_round_trip() {
        let h = Harness::new();
        let live = options([
            ("config_key", json!("limits")),
            ("config_value", json!({"cpu": 2.5})),
            ("config_value_type", json!("dict")),
        ]);

        let declaration = Config.describe(&Value::Object(live.clone())).unwrap();
        h.ensure(&Config, "limits", &declaration).unwrap();
        assert_eq!(h.boundary.calls_for("config save"), vec![live]);
    }

    #[test]
    fn test_describe_round_trip_keeps_template_text() {
        let h = Harness::new();
        let live = options([
            ("config_key", json!("greeting")),
            (
                "config_value",
                json!({"text": "hello @{user}", "@{key}": "?{a == b} x|y", "list": ["@@{kept}"]}),
            ),
            ("config_value_type", json!("dict")),
        ]);

        let declaration = Config.describe(&Value::Object(live.clone())).unwrap();
        h.ensure(&Config, "greeting", &declaration).unwrap();
        assert_eq!(h.boundary.calls_for("config save"), vec![live]);
        assert_eq!(h.variables.get("greeting").unwrap()["text"], json!("hello @{user}"));
    }

    #[test]
    fn test_value_types() {
        assert_eq!(value_type(&json!(1.5)), "float");
        assert_eq!(value_type(&json!("x")), "str");
        assert_eq!(value_type(&json!(true)), "bool");
        assert_eq!(value_type(&json!(null)), "null");
    }
}
