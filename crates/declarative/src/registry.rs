//! Unit registry - maps unit type names to components and orders them

use crate::component::{BoxedComponent, Component};
use crate::components;
use crate::error::{Error, Result};
use crate::types::Mode;
use serde::Serialize;
use std::collections::BTreeMap;

/// Public description of a registered unit type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitDescriptor {
    pub name: String,
    pub priority: i32,
    pub skip_run: bool,
    pub skip_describe: bool,
    pub parallel: bool,
}

impl UnitDescriptor {
    fn of(component: &dyn Component) -> Self {
        Self {
            name: component.name().to_string(),
            priority: component.priority(),
            skip_run: component.skip_run(),
            skip_describe: component.skip_describe(),
            parallel: component.can_parallelize(),
        }
    }
}

/// Registered unit types, keyed by name
///
/// Names iterate lexicographically, which breaks priority ties
/// deterministically.
pub struct Registry {
    units: BTreeMap<&'static str, BoxedComponent>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            units: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in unit type
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for component in components::builtin() {
            // Built-in names are distinct
            let name = component.name();
            registry.units.insert(name, component);
        }
        registry
    }

    /// Add a unit type; names must be unique
    pub fn register(&mut self, component: BoxedComponent) -> Result<()> {
        let name = component.name();
        if self.units.contains_key(name) {
            return Err(Error::DuplicateUnit {
                name: name.to_string(),
            });
        }
        log::debug!("Registered unit type '{}' (priority {})", name, component.priority());
        self.units.insert(name, component);
        Ok(())
    }

    /// Look up a unit type
    pub fn get(&self, name: &str) -> Option<&dyn Component> {
        self.units.get(name).map(AsRef::as_ref)
    }

    /// Look up a unit type, failing for unknown names
    pub fn require(&self, name: &str) -> Result<&dyn Component> {
        self.get(name).ok_or_else(|| Error::UnknownUnit {
            name: name.to_string(),
        })
    }

    /// Whether a unit type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Number of registered unit types
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Components in execution order for a mode
    ///
    /// Provisioning runs ascending priority, destroying descending; equal
    /// priorities keep name order in both directions.
    pub fn ordered(&self, mode: Mode) -> Vec<&dyn Component> {
        let mut components: Vec<&dyn Component> = self.units.values().map(AsRef::as_ref).collect();
        // Stable sort keeps lexicographic order within a priority
        match mode {
            Mode::Provisioning => components.sort_by_key(|c| c.priority()),
            Mode::Destroying => components.sort_by_key(|c| std::cmp::Reverse(c.priority())),
        }
        components
    }

    /// Descriptors in provisioning order
    pub fn descriptors(&self) -> Vec<UnitDescriptor> {
        self.ordered(Mode::Provisioning)
            .into_iter()
            .map(UnitDescriptor::of)
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::UnitContext;
    use crate::types::Outcome;
    use serde_json::Value;

    struct Fixed(&'static str, i32);

    impl Component for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn priority(&self) -> i32 {
            self.1
        }

        fn ensure(&self, _ctx: &UnitContext<'_>, _declaration: &Value) -> Result<Outcome> {
            Ok(Outcome::NoChange)
        }

        fn destroy(&self, _ctx: &UnitContext<'_>, _declaration: &Value) -> Result<Outcome> {
            Ok(Outcome::NoChange)
        }
    }

    fn names(components: &[&dyn Component]) -> Vec<&'static str> {
        components.iter().map(|c| c.name()).collect()
    }

    #[test]
    fn test_builtin_order() {
        let registry = Registry::builtin();
        assert_eq!(
            names(&registry.ordered(Mode::Provisioning)),
            vec!["config_store", "config", "role", "group", "model", "run", "profile", "destroy"]
        );
        assert_eq!(
            names(&registry.ordered(Mode::Destroying)),
            vec!["destroy", "profile", "run", "model", "group", "role", "config", "config_store"]
        );
    }

    #[test]
    fn test_ties_broken_by_name() {
        let mut registry = Registry::new();
        registry.register(Box::new(Fixed("zeta", 1))).unwrap();
        registry.register(Box::new(Fixed("alpha", 1))).unwrap();
        registry.register(Box::new(Fixed("first", 0))).unwrap();

        assert_eq!(names(&registry.ordered(Mode::Provisioning)), vec!["first", "alpha", "zeta"]);
        assert_eq!(names(&registry.ordered(Mode::Destroying)), vec!["alpha", "zeta", "first"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = Registry::builtin();
        let err = registry.register(Box::new(Fixed("config", 3))).unwrap_err();
        assert!(matches!(err, Error::DuplicateUnit { .. }));
    }

    #[test]
    fn test_unknown_unit() {
        let registry = Registry::builtin();
        assert!(registry.require("network").is_err());
        assert_eq!(registry.require("run").unwrap().priority(), 50);
    }

    #[test]
    fn test_descriptors() {
        let descriptors = Registry::builtin().descriptors();
        let store = &descriptors[0];
        assert_eq!(store.name, "config_store");
        assert!(store.skip_describe);
        assert!(!store.parallel);
        assert_eq!(descriptors.len(), 8);
    }
}
