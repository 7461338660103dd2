//! `group` unit: hierarchical groups with nested children.
//!
//! A group declaration is null (no children), a child name, a list of child
//! names or nested mappings, or a mapping of child name to nested declaration.

use super::{MAX_DEPTH, options};
use crate::component::Component;
use crate::context::UnitContext;
use crate::error::{Error, Result};
use crate::types::Outcome;
use interpolate::escape;
use serde_json::{Value, json};

/// Saves groups parent-first and removes them children-first.
#[derive(Debug, Default)]
pub struct Group;

/// Children declared under a group, in declaration order.
fn child_entries(declaration: &Value) -> std::result::Result<Vec<(String, Value)>, String> {
    match declaration {
        Value::Null => Ok(Vec::new()),
        Value::String(name) => Ok(vec![(name.clone(), Value::Null)]),
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::Array(items) => {
            let mut entries = Vec::new();
            for item in items {
                match item {
                    Value::String(name) => entries.push((name.clone(), Value::Null)),
                    Value::Object(map) => {
                        entries.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    other => return Err(format!("child entries must be names or mappings, got {other}")),
                }
            }
            Ok(entries)
        }
        other => Err(format!("children must be a name, list or mapping, got {other}")),
    }
}

fn check_tree(unit: &str, root: &str, declaration: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::declaration(
            unit,
            root,
            "children",
            format!("groups nest deeper than {MAX_DEPTH} levels"),
        ));
    }
    let children =
        child_entries(declaration).map_err(|message| Error::declaration(unit, root, "children", message))?;
    for (_, sub) in &children {
        check_tree(unit, root, sub, depth + 1)?;
    }
    Ok(())
}

impl Group {
    fn ensure_tree(ctx: &UnitContext<'_>, name: &str, declaration: &Value, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(ctx.declaration_error("children", format!("groups nest deeper than {MAX_DEPTH} levels")));
        }

        ctx.exec("group save", options([("group_key", json!(name))]))?;

        let children = child_entries(declaration).map_err(|m| ctx.declaration_error("children", m))?;
        for (child, sub) in &children {
            Self::ensure_tree(ctx, child, sub, depth + 1)?;
        }

        if !children.is_empty() {
            let keys: Vec<Value> = children.iter().map(|(child, _)| json!(child)).collect();
            ctx.exec(
                "group children",
                options([("group_key", json!(name)), ("group_child_keys", Value::Array(keys))]),
            )?;
        }
        Ok(())
    }

    fn destroy_tree(ctx: &UnitContext<'_>, name: &str, declaration: &Value, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(ctx.declaration_error("children", format!("groups nest deeper than {MAX_DEPTH} levels")));
        }

        let children = child_entries(declaration).map_err(|m| ctx.declaration_error("children", m))?;
        for (child, sub) in &children {
            Self::destroy_tree(ctx, child, sub, depth + 1)?;
        }

        ctx.exec(
            "group remove",
            options([("group_key", json!(name)), ("force", json!(true))]),
        )?;
        Ok(())
    }
}

impl Component for Group {
    fn name(&self) -> &'static str {
        "group"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn validate(&self, instance: &str, declaration: &Value) -> Result<()> {
        check_tree(self.name(), instance, declaration, 0)
    }

    fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let resolved = ctx.interpolate(declaration, None)?;
        Self::ensure_tree(ctx, ctx.instance(), &resolved, 0)?;
        Ok(Outcome::Applied)
    }

    fn destroy(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
        let resolved = ctx.interpolate(declaration, None)?;
        Self::destroy_tree(ctx, ctx.instance(), &resolved, 0)?;
        Ok(Outcome::Removed)
    }

    fn describe(&self, instance: &Value) -> Result<Value> {
        match instance.get("group_child_keys") {
            Some(Value::Array(keys)) if !keys.is_empty() => Ok(escape(&Value::Array(keys.clone()))),
            _ => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::Harness;

    fn nested(depth: usize) -> Value {
        (0..depth).fold(Value::Null, |inner, level| {
            let mut map = serde_json::Map::new();
            map.insert(format!("g{level}"), inner);
            Value::Object(map)
        })
    }

    #[test]
    fn test_ensure_parent_then_children() {
        let h = Harness::new();
        let decl = json!({"dev": ["alice", "bob"], "ops": null});

        h.ensure(&Group, "staff", &decl).unwrap();

        assert_eq!(
            h.boundary.commands(),
            vec![
                "group save",     // staff
                "group save",     // dev
                "group save",     // alice
                "group save",     // bob
                "group children", // dev -> alice, bob
                "group save",     // ops
                "group children", // staff -> dev, ops
            ]
        );
        let links = h.boundary.calls_for("group children");
        assert_eq!(links[1]["group_child_keys"], json!(["dev", "ops"]));
    }

    #[test]
    fn test_destroy_deepest_first() {
        let h = Harness::new();
        let decl = json!({"dev": "alice"});

        h.destroy(&Group, "staff", &decl).unwrap();

        let removed: Vec<_> = h
            .boundary
            .calls_for("group remove")
            .iter()
            .map(|o| o["group_key"].clone())
            .collect();
        assert_eq!(removed, vec![json!("alice"), json!("dev"), json!("staff")]);
        assert!(
            h.boundary
                .calls_for("group remove")
                .iter()
                .all(|o| o["force"] == json!(true))
        );
    }

    #[test]
    fn test_depth_guard() {
        assert!(Group.validate("root", &nested(MAX_DEPTH)).is_ok());
        let err = Group.validate("root", &nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(err.to_string().contains("deeper"));

        let h = Harness::new();
        assert!(h.ensure(&Group, "root", &nested(MAX_DEPTH + 1)).is_err());
    }

    #[test]
    fn test_invalid_children() {
        assert!(Group.validate("g", &json!(5)).is_err());
        assert!(Group.validate("g", &json!([true])).is_err());
    }

    #[test]
    fn test_templated_child_names() {
        let h = Harness::new();
        h.variables.set("teams", json!(["red", "blue"]));

        h.ensure(&Group, "all", &json!({"@{teams}": null})).unwrap();
        let links = h.boundary.calls_for("group children");
        assert_eq!(links[0]["group_child_keys"], json!(["red", "blue"]));
    }

    #[test]
    fn test_describe_round_trip() {
        let h = Harness::new();
        let live = options([
            ("group_key", json!("staff")),
            ("group_child_keys", json!(["a", "@{b}", "?{c} d|e"])),
        ]);

        let declaration = Group.describe(&Value::Object(live.clone())).unwrap();
        h.ensure(&Group, "staff", &declaration).unwrap();
        assert_eq!(h.boundary.calls_for("group children"), vec![live]);
    }
}
