//! Built-in unit types
//!
//! | unit           | priority | parallel | scoped |
//! |----------------|---------:|:--------:|:------:|
//! | `config_store` | -10      | no       | no     |
//! | `config`       | 0        | no       | no     |
//! | `role`         | 5        | yes      | yes    |
//! | `group`        | 10       | yes      | no     |
//! | `model`        | 20       | yes      | yes    |
//! | `run`          | 50       | yes      | yes    |
//! | `profile`      | 80       | yes      | yes    |
//! | `destroy`      | 90       | yes      | yes    |

pub mod config;
pub mod config_store;
pub mod destroy;
pub mod group;
pub mod profile;
pub mod record;
pub mod run;

use crate::component::BoxedComponent;
use crate::context::UnitContext;
use crate::directive::Parsed;
use crate::error::{Error, Result};
use crate::scope;
use crate::types::Declaration;
use serde_json::Value;

pub use config::Config;
pub use config_store::ConfigStore;
pub use destroy::Destroy;
pub use group::Group;
pub use profile::ProfileUnit;
pub use record::Record;
pub use run::Run;

/// Maximum nesting depth for recursive declarations (`group`, `destroy` children).
pub const MAX_DEPTH: usize = 32;

/// Every built-in component.
pub fn builtin() -> Vec<BoxedComponent> {
    vec![
        Box::new(ConfigStore),
        Box::new(Config),
        Box::new(Record::role()),
        Box::new(Group),
        Box::new(Record::model()),
        Box::new(Run),
        Box::new(ProfileUnit),
        Box::new(Destroy),
    ]
}

/// Build an options mapping from key/value pairs.
pub(crate) fn options<const N: usize>(entries: [(&str, Value); N]) -> Declaration {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Attach a scope assignment under `scope` when the declaration is scoped.
pub(crate) fn with_scope(mut options: Declaration, assignment: &Declaration) -> Declaration {
    if !assignment.is_empty() {
        options.insert("scope".to_string(), Value::Object(assignment.clone()));
    }
    options
}

/// Interpolate and expand the `_scopes` directive of an instance.
pub(crate) fn scope_assignments(ctx: &UnitContext<'_>, parsed: &Parsed) -> Result<Vec<Declaration>> {
    let spec = match parsed.get("_scopes") {
        Some(raw) => Some(ctx.interpolate_directive("_scopes", raw, None)?),
        None => None,
    };
    let assignments = scope::expand_value(spec.as_ref())
        .map_err(|e| ctx.declaration_error("_scopes", e.to_string()))?;
    if assignments.is_empty() {
        log::warn!(
            "{} '{}': scope spec expands to no assignments",
            ctx.unit(),
            ctx.instance()
        );
    }
    Ok(assignments)
}

/// Require a mapping (or null) declaration and check its `_scopes` shape.
pub(crate) fn validate_mapping(unit: &str, instance: &str, declaration: &Value) -> Result<Parsed> {
    let parsed = match declaration {
        Value::Null => Parsed::default(),
        Value::Object(map) => Parsed::new(map),
        other => {
            return Err(Error::declaration(
                unit,
                instance,
                "",
                format!("declaration must be a mapping, got {other}"),
            ));
        }
    };

    match parsed.get("_scopes") {
        // Templated specs are checked once resolved
        None | Some(Value::String(_)) => {}
        Some(spec) => {
            scope::expand_value(Some(spec))
                .map_err(|e| Error::declaration(unit, instance, "_scopes", e.to_string()))?;
        }
    }

    Ok(parsed)
}

/// Require at least one of `keys` to be present.
pub(crate) fn require_any(unit: &str, instance: &str, parsed: &Parsed, keys: &[&str]) -> Result<()> {
    if keys.iter().any(|k| parsed.has(k)) {
        Ok(())
    } else {
        Err(Error::declaration(
            unit,
            instance,
            keys.join("|"),
            format!("requires one of {}", keys.join(", ")),
        ))
    }
}

/// Lift a live `scope` mapping back into a `_scopes` spec with one candidate per dimension.
pub(crate) fn scopes_from_live(instance: &Declaration) -> Option<Value> {
    let scope = instance.get("scope")?.as_object()?;
    if scope.is_empty() {
        return None;
    }
    Some(Value::Object(
        scope
            .iter()
            .map(|(k, v)| (k.clone(), Value::Array(vec![v.clone()])))
            .collect(),
    ))
}
