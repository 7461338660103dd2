//! `profile` unit: applies profiles of other modules (profile-of-profiles).

use super::{options, require_any, scope_assignments, validate_mapping};
use crate::component::Component;
use crate::context::UnitContext;
use crate::directive::Parsed;
use crate::error::Result;
use crate::types::{Declaration, Outcome};
use serde_json::{Value, json};

/// `module profile {module_key, profile_key, profile_config_fields, [profile_components]}`
#[derive(Debug, Default)]
pub struct ProfileUnit;

impl ProfileUnit {
    fn module_options(ctx: &UnitContext<'_>, parsed: &Parsed, assignment: &Declaration) -> Result<Declaration> {
        let module = parsed
            .get("_module")
            .ok_or_else(|| ctx.declaration_error("_module", "requires _module"))?;
        let module_key = ctx.directive_text("_module", module, Some(assignment))?;
        let profile_key = match parsed.get("_profile") {
            Some(profile) => ctx.directive_text("_profile", profile, Some(assignment))?,
            None => ctx.instance().to_string(),
        };

        let mut fields = assignment.clone();
        fields.extend(ctx.interpolate_map(parsed.payload(), Some(assignment))?);

        let mut opts = options([
            ("module_key", json!(module_key)),
            ("profile_key", json!(profile_key)),
            ("profile_config_fields", Value::Object(fields)),
        ]);
        if let Some(components) = parsed.get("_components") {
            let components = ctx.interpolate_directive("_components", components, Some(assignment))?;
            let components = match components {
                Value::Array(_) => components,
                single => Value::Array(vec![single]),
            };
            opts.insert("profile_components".to_string(), components);
        }
        Ok(opts)
    }
}

impl Component for ProfileUnit {
    fn name(&self) -> &'static str {
        "profile"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn skip_describe(&self) -> bool {
        true
    }

    fn validate(&self, instance: &str, declaration: &Value) -> Result<()> {
        let parsed = validate_mapping(self.name(), instance, declaration)?;
        require_any(self.name(), instance, &parsed, &["_module"])
    }

    fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let parsed = Parsed::from_value(declaration);
        let mut outcome = Outcome::NoChange;
        for assignment in scope_assignments(ctx, &parsed)? {
            ctx.exec("module profile", Self::module_options(ctx, &parsed, &assignment)?)?;
            outcome = Outcome::Applied;
        }
        Ok(outcome)
    }

    fn destroy(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let parsed = Parsed::from_value(declaration);
        let mut outcome = Outcome::NoChange;
        for assignment in scope_assignments(ctx, &parsed)? {
            ctx.exec("module destroy", Self::module_options(ctx, &parsed, &assignment)?)?;
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
    fn test_profile_dispatch() {
        let h = Harness::new();
        let decl = json!({"_module": "monitoring", "_components": "alerts", "retention": 30});

        h.ensure(&ProfileUnit, "base", &decl).unwrap();
        assert_eq!(
            h.boundary.calls_for("module profile"),
            vec![options([
                ("module_key", json!("monitoring")),
                ("profile_key", json!("base")),
                ("profile_config_fields", json!({"retention": 30})),
                ("profile_components", json!(["alerts"])),
            ])]
        );
    }

    #[test]
    fn test_profile_name_override_and_destroy() {
        let h = Harness::new();
        let decl = json!({"_module": "web", "_profile": "cluster", "_scopes": {"zone": ["a", "b"]}});

        h.destroy(&ProfileUnit, "web-cluster", &decl).unwrap();
        let calls = h.boundary.calls_for("module destroy");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["profile_key"], json!("cluster"));
        assert_eq!(calls[1]["profile_config_fields"], json!({"zone": "b"}));
    }

    #[test]
    fn test_requires_module() {
        assert!(ProfileUnit.validate("p", &json!({"x": 1})).is_err());
    }
}
