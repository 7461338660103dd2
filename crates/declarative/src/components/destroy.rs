//! `destroy` unit: removes resources (and their dependents) while provisioning.
//!
//! Used to retire records as part of a profile: dependents listed under
//! `_children` are removed depth-first before the named resource. Children
//! declaring neither `_model` nor `_command` inherit the parent's.

use super::{MAX_DEPTH, options, require_any, scope_assignments, validate_mapping, with_scope};
use crate::component::Component;
use crate::context::UnitContext;
use crate::directive::Parsed;
use crate::error::{Error, Result};
use crate::types::{Declaration, Outcome};
use serde_json::{Value, json};

/// Removes `data` records or runs a removal command.
#[derive(Debug, Default)]
pub struct Destroy;

fn child_entries(children: Option<&Value>) -> std::result::Result<Vec<(String, Value)>, String> {
    match children {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Some(Value::Array(items)) => {
            let mut entries = Vec::new();
            for item in items {
                match item {
                    Value::String(name) => entries.push((name.clone(), Value::Null)),
                    Value::Object(map) => entries.extend(map.iter().map(|(k, v)| (k.clone(), v.clone()))),
                    other => return Err(format!("_children entries must be names or mappings, got {other}")),
                }
            }
            Ok(entries)
        }
        Some(other) => Err(format!("_children must be a list or mapping, got {other}")),
    }
}

fn child_of(parent: &Parsed, declaration: &Value) -> Parsed {
    let child = Parsed::from_value(declaration);
    if child.has("_model") || child.has("_command") {
        child
    } else {
        child.inherit("_model", parent).inherit("_command", parent)
    }
}

fn check_tree(unit: &str, root: &str, parsed: &Parsed, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::declaration(
            unit,
            root,
            "_children",
            format!("children nest deeper than {MAX_DEPTH} levels"),
        ));
    }
    let children = child_entries(parsed.get("_children"))
        .map_err(|message| Error::declaration(unit, root, "_children", message))?;
    for (_, declaration) in &children {
        if !declaration.is_null() && !declaration.is_object() {
            return Err(Error::declaration(
                unit,
                root,
                "_children",
                format!("child declarations must be mappings, got {declaration}"),
            ));
        }
        check_tree(unit, root, &child_of(parsed, declaration), depth + 1)?;
    }
    Ok(())
}

impl Destroy {
    fn remove_tree(
        ctx: &UnitContext<'_>,
        name: &str,
        parsed: &Parsed,
        assignment: &Declaration,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(ctx.declaration_error("_children", format!("children nest deeper than {MAX_DEPTH} levels")));
        }

        let children = child_entries(parsed.get("_children")).map_err(|m| ctx.declaration_error("_children", m))?;
        for (child, declaration) in &children {
            let child_name = match ctx.interpolate(&json!(child), Some(assignment))? {
                Value::String(text) => text,
                other => other.to_string(),
            };
            Self::remove_tree(ctx, &child_name, &child_of(parsed, declaration), assignment, depth + 1)?;
        }

        if let Some(command) = parsed.get("_command") {
            let command = ctx.directive_text("_command", command, Some(assignment))?;
            let mut opts = options([("key", json!(name))]);
            opts.extend(assignment.clone());
            opts.extend(ctx.interpolate_map(parsed.payload(), Some(assignment))?);
            ctx.exec(&command, opts)?;
        } else if let Some(model) = parsed.get("_model") {
            let data_type = ctx.directive_text("_model", model, Some(assignment))?;
            let opts = options([
                ("data_type", json!(data_type)),
                ("key", json!(name)),
                ("force", json!(true)),
            ]);
            ctx.exec("data remove", with_scope(opts, assignment))?;
        } else {
            return Err(ctx.declaration_error("_model|_command", "requires one of _model, _command"));
        }
        Ok(())
    }
}

impl Component for Destroy {
    fn name(&self) -> &'static str {
        "destroy"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn skip_describe(&self) -> bool {
        true
    }

    fn validate(&self, instance: &str, declaration: &Value) -> Result<()> {
        let parsed = validate_mapping(self.name(), instance, declaration)?;
        require_any(self.name(), instance, &parsed, &["_model", "_command"])?;
        check_tree(self.name(), instance, &parsed, 0)
    }

    fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let parsed = Parsed::from_value(declaration);
        let mut outcome = Outcome::NoChange;
        for assignment in scope_assignments(ctx, &parsed)? {
            Self::remove_tree(ctx, ctx.instance(), &parsed, &assignment, 0)?;
            outcome = Outcome::Removed;
        }
        Ok(outcome)
    }

    fn destroy(&self, _ctx: &UnitContext<'_>, _declaration: &Value) -> Result<Outcome> {
        Ok(Outcome::skipped("destroy units only run while provisioning"))
    }
}
