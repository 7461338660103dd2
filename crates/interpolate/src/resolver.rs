//! Scalar resolvers.
//!
//! A resolver looks at one scalar and either leaves it alone (`Ok(None)`) or
//! produces a replacement. The engine runs resolvers in registration order and
//! feeds each replacement to the next resolver, never back to the one that
//! produced it.

use crate::condition;
use crate::error::{Error, Result};
use crate::store::VariableStore;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Values visible to resolvers during one interpolation call.
///
/// `locals` (for example the current scope assignment) shadow runtime variables.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    variables: &'a VariableStore,
    locals: Option<&'a Map<String, Value>>,
}

impl<'a> Context<'a> {
    /// Context backed only by the runtime variable store.
    pub fn new(variables: &'a VariableStore) -> Self {
        Self {
            variables,
            locals: None,
        }
    }

    /// Add call-local values that take precedence over runtime variables.
    pub fn with_locals(mut self, locals: &'a Map<String, Value>) -> Self {
        self.locals = Some(locals);
        self
    }

    /// Look up a name, locals first.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.locals
            .and_then(|locals| locals.get(name).cloned())
            .or_else(|| self.variables.get(name))
    }
}

/// One link of the resolver chain.
pub trait Resolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Resolve a scalar, returning `None` when the resolver does not apply.
    fn resolve(&self, value: &Value, ctx: &Context<'_>) -> Result<Option<Value>>;
}

// ============================================================================
// Reference resolver
// ============================================================================

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(@@|@)\{([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\}")
        .expect("reference pattern is valid")
});

/// Substitutes `@{name}` references from locals and runtime variables.
///
/// `@{name.key.0}` walks into mappings and sequences. A scalar consisting of a
/// single reference is replaced by the typed value; references embedded in
/// longer text are substituted as text. `@@{name}` is an escape producing the
/// literal `@{name}`.
#[derive(Debug, Default)]
pub struct ReferenceResolver;

/// Look up `name.key.0`, walking into mappings and sequences.
pub(crate) fn lookup_reference(reference: &str, ctx: &Context<'_>) -> Result<Value> {
    let unresolved = || Error::UnresolvedReference {
        name: reference.to_string(),
    };
    let mut segments = reference.split('.');
    let head = segments.next().unwrap_or_default();
    let mut current = ctx.lookup(head).ok_or_else(unresolved)?;

    for segment in segments {
        let next = match &current {
            Value::Object(map) => map.get(segment).cloned(),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index).cloned()),
            _ => None,
        };
        current = next.ok_or_else(unresolved)?;
    }

    Ok(current)
}

/// Render a value for embedding in text.
pub fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Resolver for ReferenceResolver {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn resolve(&self, value: &Value, ctx: &Context<'_>) -> Result<Option<Value>> {
        let Value::String(text) = value else {
            return Ok(None);
        };
        if !text.contains("@{") {
            return Ok(None);
        }

        if let Some(caps) = REFERENCE.captures(text)
            && caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == text.len())
            && &caps[1] == "@"
        {
            return lookup_reference(&caps[2], ctx).map(Some);
        }

        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for caps in REFERENCE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            output.push_str(&text[last..whole.start()]);
            output.push_str(&substitute(&caps, ctx)?);
            last = whole.end();
        }
        output.push_str(&text[last..]);

        Ok(Some(Value::String(output)))
    }
}

fn substitute(caps: &Captures<'_>, ctx: &Context<'_>) -> Result<String> {
    if &caps[1] == "@@" {
        return Ok(format!("@{{{}}}", &caps[2]));
    }
    lookup_reference(&caps[2], ctx).map(|value| render_text(&value))
}

// ============================================================================
// Escaping
// ============================================================================

static UNESCAPED_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(\{[A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*\})")
        .expect("reference pattern is valid")
});

/// Escape text so the standard chain resolves it back to itself.
///
/// Every `@{name}` gains an extra `@`, and a leading `?{` (after any run of
/// `?`) gains an extra `?`.
pub fn escape_text(text: &str) -> String {
    let mut escaped = UNESCAPED_REFERENCE.replace_all(text, "@@${1}").into_owned();

    let start = escaped.len() - escaped.trim_start().len();
    let rest = &escaped[start..];
    let marks = rest.len() - rest.trim_start_matches('?').len();
    if marks > 0 && rest[marks..].starts_with('{') {
        escaped.insert(start, '?');
    }
    escaped
}

// ============================================================================
// Conditional resolver
// ============================================================================

/// Evaluates `?{condition} when-true|when-false` scalars.
///
/// The condition is evaluated with [`condition::evaluate_bool`] against the
/// context, so `@{name}` operands are looked up rather than spliced in as
/// text. The chosen branch is parsed with [`condition::parse_literal`] and
/// left for the next resolver, which substitutes references inside it. Only
/// single-line, non-nested conditionals are accepted; `??{` is an escape for
/// a literal leading `?{`.
#[derive(Debug, Default)]
pub struct ConditionalResolver;

impl ConditionalResolver {
    fn split(text: &str) -> std::result::Result<(&str, &str, &str), String> {
        if text.contains('\n') {
            return Err("conditionals must fit on one line".to_string());
        }

        let body = &text[2..];
        let close = find_unquoted(body, '}').ok_or("missing closing '}'")?;
        let condition = &body[..close];
        let branches = &body[close + 1..];

        let bar = find_unquoted(branches, '|').ok_or("missing '|' between branches")?;
        let (when_true, when_false) = (&branches[..bar], &branches[bar + 1..]);

        if when_true.contains("?{") || when_false.contains("?{") || condition.contains("?{") {
            return Err("nested conditionals are not supported".to_string());
        }

        Ok((condition, when_true, when_false))
    }
}

/// Position of `target` outside quotes and outside `{...}` groups.
fn find_unquoted(text: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;

    for (index, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            (None, c) if c == target && depth == 0 => return Some(index),
            (None, '{') => depth += 1,
            (None, '}') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    None
}

impl Resolver for ConditionalResolver {
    fn name(&self) -> &'static str {
        "conditional"
    }

    fn resolve(&self, value: &Value, ctx: &Context<'_>) -> Result<Option<Value>> {
        let Value::String(text) = value else {
            return Ok(None);
        };
        let trimmed = text.trim();
        if trimmed.starts_with("??") && trimmed.trim_start_matches('?').starts_with('{') {
            let mut unescaped = text.clone();
            unescaped.remove(text.len() - text.trim_start().len());
            return Ok(Some(Value::String(unescaped)));
        }
        if !trimmed.starts_with("?{") {
            return Ok(None);
        }

        let (condition, when_true, when_false) =
            Self::split(trimmed).map_err(|message| Error::MalformedCondition {
                expression: trimmed.to_string(),
                message,
            })?;

        let branch = if condition::evaluate_bool(condition, ctx)? {
            when_true
        } else {
            when_false
        };

        Ok(Some(condition::parse_literal(branch)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> VariableStore {
        VariableStore::with_values([
            ("env", json!("prod")),
            ("port", json!(8080)),
            ("db", json!({"host": "db.local", "replicas": ["r1", "r2"]})),
        ])
    }

    #[test]
    fn test_whole_reference_keeps_type() {
        let vars = store();
        let ctx = Context::new(&vars);
        let resolved = ReferenceResolver.resolve(&json!("@{port}"), &ctx).unwrap();
        assert_eq!(resolved, Some(json!(8080)));

        let nested = ReferenceResolver
            .resolve(&json!("@{db.replicas.1}"), &ctx)
            .unwrap();
        assert_eq!(nested, Some(json!("r2")));
    }

    #[test]
    fn test_embedded_references_render_as_text() {
        let vars = store();
        let ctx = Context::new(&vars);
        let resolved = ReferenceResolver
            .resolve(&json!("http://@{db.host}:@{port}/@{env}"), &ctx)
            .unwrap();
        assert_eq!(resolved, Some(json!("http://db.local:8080/prod")));
    }

    #[test]
    fn test_locals_shadow_variables() {
        let vars = store();
        let locals = json!({"env": "dev"});
        let ctx = Context::new(&vars).with_locals(locals.as_object().unwrap());
        let resolved = ReferenceResolver.resolve(&json!("@{env}"), &ctx).unwrap();
        assert_eq!(resolved, Some(json!("dev")));
    }

    #[test]
    fn test_missing_reference_is_error() {
        let vars = VariableStore::new();
        let ctx = Context::new(&vars);
        let err = ReferenceResolver
            .resolve(&json!("@{missing_name}"), &ctx)
            .unwrap_err();
        assert_eq!(err.missing_reference(), Some("missing_name"));
        assert!(err.to_string().contains("missing_name"));
    }

    #[test]
    fn test_escaped_reference_is_literal() {
        let vars = VariableStore::new();
        let ctx = Context::new(&vars);
        let resolved = ReferenceResolver
            .resolve(&json!("@@{literal}"), &ctx)
            .unwrap();
        assert_eq!(resolved, Some(json!("@{literal}")));
    }

    #[test]
    fn test_non_matching_values_untouched() {
        let vars = VariableStore::new();
        let ctx = Context::new(&vars);
        assert_eq!(ReferenceResolver.resolve(&json!(5), &ctx).unwrap(), None);
        assert_eq!(
            ReferenceResolver.resolve(&json!("user@example.com"), &ctx).unwrap(),
            None
        );
    }

    #[test]
    fn test_conditional_branches() {
        let vars = VariableStore::new();
        let ctx = Context::new(&vars);

        let picked = ConditionalResolver
            .resolve(&json!("?{prod == prod} 3|1"), &ctx)
            .unwrap();
        assert_eq!(picked, Some(json!(3)));

        let picked = ConditionalResolver
            .resolve(&json!("?{'a|b' == 'c'} \"large\"|small"), &ctx)
            .unwrap();
        assert_eq!(picked, Some(json!("small")));
    }

    #[test]
    fn test_conditional_reads_context() {
        let vars = VariableStore::with_values([
            ("name", json!("a b")),
            ("v", json!("x|y")),
            ("brace", json!("}{")),
        ]);
        let ctx = Context::new(&vars);

        let picked = ConditionalResolver
            .resolve(&json!("?{@{name} == 'a b'} yes|no"), &ctx)
            .unwrap();
        assert_eq!(picked, Some(json!("yes")));

        let picked = ConditionalResolver
            .resolve(&json!("?{@{brace} == '}{'} @{v}|z"), &ctx)
            .unwrap();
        assert_eq!(picked, Some(json!("@{v}")));

        let err = ConditionalResolver
            .resolve(&json!("?{@{missing_name}} a|b"), &ctx)
            .unwrap_err();
        assert_eq!(err.missing_reference(), Some("missing_name"));
    }

    #[test]
    fn test_escaped_conditional_is_literal() {
        let vars = VariableStore::new();
        let ctx = Context::new(&vars);
        assert_eq!(
            ConditionalResolver.resolve(&json!("??{true} a|b"), &ctx).unwrap(),
            Some(json!("?{true} a|b"))
        );
        assert_eq!(
            ConditionalResolver.resolve(&json!("  ???{x"), &ctx).unwrap(),
            Some(json!("  ??{x"))
        );
        assert_eq!(ConditionalResolver.resolve(&json!("??"), &ctx).unwrap(), None);
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("hello @{user}"), "hello @@{user}");
        assert_eq!(escape_text("@@{kept}"), "@@@{kept}");
        assert_eq!(escape_text("@{not valid!}"), "@{not valid!}");
        assert_eq!(escape_text("?{true} a|b"), "??{true} a|b");
        assert_eq!(escape_text(" ??{x"), " ???{x");
        assert_eq!(escape_text("why?{not}"), "why?{not}");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn test_conditional_malformed() {
        let vars = VariableStore::new();
        let ctx = Context::new(&vars);

        for bad in [
            "?{true yes|no",
            "?{true} yes no",
            "?{true} ?{false} a|b|c",
            "?{1 ==} a|b",
        ] {
            let err = ConditionalResolver.resolve(&json!(bad), &ctx).unwrap_err();
            assert!(
                matches!(err, Error::MalformedCondition { .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn test_find_unquoted_skips_quotes() {
        assert_eq!(find_unquoted("'}' }", '}'), Some(4));
        assert_eq!(find_unquoted("\"a\\\"|\" | b", '|'), Some(7));
        assert_eq!(find_unquoted("abc", '|'), None);
        assert_eq!(find_unquoted("@{a} == b} x|y", '}'), Some(9));
        assert_eq!(find_unquoted("{\"k\": \"|\"}|2", '|'), Some(10));
    }
}
