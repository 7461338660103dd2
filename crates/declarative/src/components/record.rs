//! `role` and `model` units: keyed records saved through the boundary.
//!
//! Both units share one shape: the payload becomes `fields`, the instance name
//! becomes the key, and an optional scope assignment is sent as `scope`. The
//! `model` flavour also names a data type through `_model`.

use super::{options, require_any, scope_assignments, scopes_from_live, validate_mapping, with_scope};
use crate::component::Component;
use crate::context::UnitContext;
use crate::directive::Parsed;
use crate::error::{Error, Result};
use crate::types::{Declaration, Outcome};
use interpolate::escape;
use serde_json::{Value, json};

/// A keyed record unit
#[derive(Debug, Clone)]
pub struct Record {
    unit: &'static str,
    priority: i32,
    save: &'static str,
    remove: &'static str,
    key_field: &'static str,
    typed: bool,
}

impl Record {
    /// `role save {role_key, fields, [scope]}` / `role remove {role_key, force, [scope]}`
    pub fn role() -> Self {
        Self {
            unit: "role",
            priority: 5,
            save: "role save",
            remove: "role remove",
            key_field: "role_key",
            typed: false,
        }
    }

    /// `data save {data_type, key, fields, [scope]}` / `data remove {data_type, key, force, [scope]}`
    pub fn model() -> Self {
        Self {
            unit: "model",
            priority: 20,
            save: "data save",
            remove: "data remove",
            key_field: "key",
            typed: true,
        }
    }

    fn base_options(
        &self,
        ctx: &UnitContext<'_>,
        parsed: &Parsed,
        assignment: &Declaration,
    ) -> Result<Declaration> {
        let mut opts = Declaration::new();
        if self.typed {
            let model = parsed
                .get("_model")
                .ok_or_else(|| ctx.declaration_error("_model", "requires _model"))?;
            opts.insert(
                "data_type".to_string(),
                json!(ctx.directive_text("_model", model, Some(assignment))?),
            );
        }
        opts.insert(self.key_field.to_string(), json!(ctx.instance()));
        Ok(opts)
    }
}

impl Component for Record {
    fn name(&self) -> &'static str {
        self.unit
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn validate(&self, instance: &str, declaration: &Value) -> Result<()> {
        let parsed = validate_mapping(self.unit, instance, declaration)?;
        if self.typed {
            require_any(self.unit, instance, &parsed, &["_model"])?;
        }
        Ok(())
    }

    fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let parsed = Parsed::from_value(declaration);
        let mut outcome = Outcome::NoChange;

        for assignment in scope_assignments(ctx, &parsed)? {
            let mut opts = self.base_options(ctx, &parsed, &assignment)?;
            let fields = ctx.interpolate_map(parsed.payload(), Some(&assignment))?;
            opts.insert("fields".to_string(), Value::Object(fields));

            ctx.exec(self.save, with_scope(opts, &assignment))?;
            outcome = Outcome::Applied;
        }

        Ok(outcome)
    }

    fn destroy(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let parsed = Parsed::from_value(declaration);
        let mut outcome = Outcome::NoChange;

        for assignment in scope_assignments(ctx, &parsed)? {
            let mut opts = self.base_options(ctx, &parsed, &assignment)?;
            opts.insert("force".to_string(), json!(true));

            ctx.exec(self.remove, with_scope(opts, &assignment))?;
            outcome = Outcome::Removed;
        }

        Ok(outcome)
    }

    fn describe(&self, instance: &Value) -> Result<Value> {
        let live = instance.as_object().ok_or_else(|| {
            Error::declaration(self.unit, "", "", format!("live instance must be a mapping, got {instance}"))
        })?;

        let mut declaration = Declaration::new();
        if self.typed
            && let Some(data_type) = live.get("data_type")
        {
            declaration.insert("_model".to_string(), data_type.clone());
        }
        if let Some(Value::Object(fields)) = live.get("fields") {
            declaration.extend(fields.clone());
        }
        if let Some(scopes) = scopes_from_live(live) {
            declaration.insert("_scopes".to_string(), scopes);
        }

        Ok(escape(&Value::Object(declaration)))
    }
}
