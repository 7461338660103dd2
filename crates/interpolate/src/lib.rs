//! # interpolate
//!
//! Resolver-chain interpolation over nested configuration values.
//!
//! This crate provides:
//! - A thread-safe runtime [`VariableStore`] shared by everything that
//!   resolves values during a run
//! - `@{name.path}` references with typed whole-value substitution and
//!   `@@{name}` escapes
//! - `?{condition} when-true|when-false` conditionals over a small, closed
//!   expression grammar (see [`condition`])
//! - Key templating: mapping keys resolve too, and may expand into several
//!   entries
//!
//! ## Example
//!
//! ```
//! use interpolate::{Context, Interpolator, VariableStore};
//! use serde_json::json;
//!
//! let vars = VariableStore::with_values([("env", json!("prod")), ("size", json!(3))]);
//! let ctx = Context::new(&vars);
//!
//! let resolved = Interpolator::standard()
//!     .interpolate(&json!({"name": "web-@{env}", "replicas": "?{@{size} > 2} 5|1"}), &ctx)
//!     .unwrap();
//!
//! assert_eq!(resolved, json!({"name": "web-prod", "replicas": 5}));
//! ```
//!
//! ## Custom resolvers
//!
//! Implement [`Resolver`] and append it with [`Interpolator::with_resolver`].
//! Resolvers run in registration order; each one sees the output of the
//! previous one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod condition;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod store;

pub use engine::{Interpolator, escape};
pub use error::{Error, Result};
pub use resolver::{
    ConditionalResolver, Context, ReferenceResolver, Resolver, escape_text, render_text,
};
pub use store::VariableStore;
