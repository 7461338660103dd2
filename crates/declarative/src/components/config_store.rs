//! `config_store` unit: seeds runtime variables without any dispatch.

use crate::component::Component;
use crate::context::UnitContext;
use crate::error::Result;
use crate::types::Outcome;
use serde_json::Value;

/// Stores the interpolated declaration as runtime variable `<instance>`.
#[derive(Debug, Default)]
pub struct ConfigStore;

impl Component for ConfigStore {
    fn name(&self) -> &'static str {
        "config_store"
    }

    fn priority(&self) -> i32 {
        -10
    }

    fn skip_describe(&self) -> bool {
        true
    }

    fn can_parallelize(&self) -> bool {
        false
    }

    fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let value = ctx.interpolate(declaration, None)?;
        let previous = ctx.variables().set(ctx.instance(), value.clone());
        log::debug!("Stored runtime variable '{}'", ctx.instance());

        Ok(if previous.as_ref() == Some(&value) {
            Outcome::NoChange
        } else {
            Outcome::Applied
        })
    }

    fn destroy(&self, ctx: &UnitContext<'_>, _declaration: &Value) -> Result<Outcome> {
        Ok(match ctx.variables().remove(ctx.instance()) {
            Some(_) => Outcome::Removed,
            None => Outcome::NoChange,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::Harness;
    use serde_json::json;

    #[test]
    fn test_seeds_variable_without_dispatch() {
        let h = Harness::new();
        h.variables.set("base", json!("example.com"));

        let outcome = h.ensure(&ConfigStore, "domain", &json!("api.@{base}")).unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(h.variables.get("domain"), Some(json!("api.example.com")));
        assert!(h.boundary.calls().is_empty());

        let again = h.ensure(&ConfigStore, "domain", &json!("api.@{base}")).unwrap();
        assert_eq!(again, Outcome::NoChange);
    }

    #[test]
    fn test_destroy_removes_variable() {
        let h = Harness::new();
        h.ensure(&ConfigStore, "x", &json!([1, 2])).unwrap();

        assert_eq!(h.destroy(&ConfigStore, "x", &json!(null)).unwrap(), Outcome::Removed);
        assert!(!h.variables.contains("x"));
        assert_eq!(h.destroy(&ConfigStore, "x", &json!(null)).unwrap(), Outcome::NoChange);
    }
}
