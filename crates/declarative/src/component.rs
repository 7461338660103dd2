//! Component trait for declarable unit types
//!
//! A component handles one kind of declaration (`config`, `group`, `run`, ...).
//! The orchestrator hands every instance declared under the component's name
//! to `ensure` while provisioning and to `destroy` while tearing down.

use crate::context::UnitContext;
use crate::error::{Error, Result};
use crate::types::Outcome;
use serde_json::Value;

/// Core trait for unit types
///
/// Every unit type implements this trait, which provides:
/// - Ordering (priority)
/// - Phase opt-outs (skip_run, skip_describe)
/// - Convergence (ensure) and teardown (destroy)
/// - Introspection for export (describe)
///
/// # Example
///
/// ```ignore
/// use declarative::{Component, Outcome, UnitContext, Result};
/// use serde_json::{Map, Value, json};
///
/// struct Bucket;
///
/// impl Component for Bucket {
///     fn name(&self) -> &'static str { "bucket" }
///     fn priority(&self) -> i32 { 30 }
///
///     fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome> {
///         let mut options = Map::new();
///         options.insert("bucket_key".into(), json!(ctx.instance()));
///         options.insert("settings".into(), ctx.interpolate(declaration, None)?);
///         ctx.exec("bucket save", options)?;
///         Ok(Outcome::Applied)
///     }
///
///     fn destroy(&self, ctx: &UnitContext<'_>, _declaration: &Value) -> Result<Outcome> {
///         let mut options = Map::new();
///         options.insert("bucket_key".into(), json!(ctx.instance()));
///         options.insert("force".into(), json!(true));
///         ctx.exec("bucket remove", options)?;
///         Ok(Outcome::Removed)
///     }
/// }
/// ```
pub trait Component: Send + Sync {
    /// Unit type name, the top-level key in profile documents
    fn name(&self) -> &'static str;

    /// Global ordering; lower runs first while provisioning
    fn priority(&self) -> i32;

    /// Opt out of ensure/destroy entirely
    fn skip_run(&self) -> bool {
        false
    }

    /// Opt out of export (no `describe` support)
    fn skip_describe(&self) -> bool {
        false
    }

    /// Whether instances of this unit may run concurrently
    ///
    /// Override to return false for units whose instances share state.
    fn can_parallelize(&self) -> bool {
        true
    }

    /// Check a raw declaration for structural problems before anything runs
    fn validate(&self, _instance: &str, _declaration: &Value) -> Result<()> {
        Ok(())
    }

    /// Converge the instance to its declared state
    ///
    /// Must be idempotent: repeated calls with the same declaration issue the
    /// same upsert-style commands.
    fn ensure(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome>;

    /// Tear the instance down
    ///
    /// Must tolerate the instance already being absent.
    fn destroy(&self, ctx: &UnitContext<'_>, declaration: &Value) -> Result<Outcome>;

    /// Rebuild a declaration from a live instance
    fn describe(&self, _instance: &Value) -> Result<Value> {
        Err(Error::Unsupported {
            unit: self.name().to_string(),
            operation: "describe",
        })
    }
}

/// A boxed component for type-erased storage
pub type BoxedComponent = Box<dyn Component>;
