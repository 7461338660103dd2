//! Interpolation engine - applies a resolver chain to nested values

use crate::error::Result;
use crate::resolver::{
    ConditionalResolver, Context, ReferenceResolver, Resolver, escape_text, render_text,
};
use serde_json::{Map, Value};

/// Rewrites every scalar of a nested value through an ordered resolver chain.
///
/// Sequences and mappings are rebuilt from their resolved children. Mapping
/// keys go through the chain too: a key that resolves to a sequence yields one
/// entry per element (all sharing the value), and a key that resolves to a
/// mapping splats that mapping's entries into the parent.
pub struct Interpolator {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl Interpolator {
    /// Engine with no resolvers; every value passes through unchanged.
    pub fn empty() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Engine with the built-in chain: conditionals, then references.
    ///
    /// Conditionals see the raw text and look their operands up in the
    /// context; references are substituted into whichever branch was chosen.
    pub fn standard() -> Self {
        Self::empty()
            .with_resolver(ConditionalResolver)
            .with_resolver(ReferenceResolver)
    }

    /// Append a resolver to the end of the chain.
    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Names of the registered resolvers, in chain order.
    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Resolve a value of any shape.
    pub fn interpolate(&self, value: &Value, ctx: &Context<'_>) -> Result<Value> {
        self.walk(value, ctx, "")
    }

    /// Resolve the keys of a mapping without touching its values.
    ///
    /// Returns entries in order; templated keys may expand into several
    /// entries, and duplicates are kept so callers can reject them.
    pub fn interpolate_keys(
        &self,
        map: &Map<String, Value>,
        ctx: &Context<'_>,
    ) -> Result<Vec<(String, Value)>> {
        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            entries.extend(
                self.resolve_key(key, value.clone(), ctx)
                    .map_err(|e| e.at(key))?,
            );
        }
        Ok(entries)
    }

    /// Run one scalar through the chain.
    pub fn resolve_scalar(&self, value: &Value, ctx: &Context<'_>) -> Result<Value> {
        let mut current = value.clone();
        for resolver in &self.resolvers {
            if let Some(replacement) = resolver.resolve(&current, ctx)? {
                log::trace!("{} resolver rewrote {} -> {}", resolver.name(), current, replacement);
                current = replacement;
            }
        }
        Ok(current)
    }

    fn walk(&self, value: &Value, ctx: &Context<'_>, path: &str) -> Result<Value> {
        match value {
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    resolved.push(self.walk(item, ctx, &join_path(path, &index.to_string()))?);
                }
                Ok(Value::Array(resolved))
            }
            Value::Object(map) => {
                let mut resolved = Map::new();
                for (key, item) in map {
                    let item_path = join_path(path, key);
                    let item = self.walk(item, ctx, &item_path)?;
                    for (new_key, new_value) in self
                        .resolve_key(key, item, ctx)
                        .map_err(|e| e.at(&item_path))?
                    {
                        resolved.insert(new_key, new_value);
                    }
                }
                Ok(Value::Object(resolved))
            }
            scalar => self.resolve_scalar(scalar, ctx).map_err(|e| e.at(path)),
        }
    }

    /// Resolve one mapping key, returning the entries it expands to.
    pub fn resolve_key(
        &self,
        key: &str,
        value: Value,
        ctx: &Context<'_>,
    ) -> Result<Vec<(String, Value)>> {
        let resolved = self.resolve_scalar(&Value::String(key.to_string()), ctx)?;
        Ok(match resolved {
            Value::String(name) => vec![(name, value)],
            Value::Array(names) => names
                .iter()
                .map(|name| (render_text(name), value.clone()))
                .collect(),
            Value::Object(entries) => entries.into_iter().collect(),
            other => vec![(render_text(&other), value)],
        })
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::standard()
    }
}

/// Escape every string and mapping key so [`Interpolator::standard`]
/// resolves the value back to itself.
pub fn escape(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(escape_text(text)),
        Value::Array(items) => Value::Array(items.iter().map(escape).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (escape_text(key), escape(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}.{segment}")
    }
}
