//! # Declarative
//!
//! A framework for applying declarative profile documents.
//!
//! A profile maps unit type names to named instances. Applying it walks the
//! unit types in priority order and converges every instance by issuing
//! commands through a [`CommandBoundary`].
//!
//! ## Core Concepts
//!
//! - **Component**: One unit type (`config`, `group`, `run`, ...) with a
//!   priority, `ensure`/`destroy` and optional `describe`
//! - **Registry**: Unit types by name, ordered into priority buckets
//! - **Profile**: A document with its `parents` merged in
//! - **Orchestrator**: Plans, validates and applies a profile, producing a [`Report`]
//! - **Executor**: Bounded parallel batches with per-item failure isolation,
//!   plus named cross-process locks
//!
//! ## Example
//!
//! ```
//! use declarative::{ApplyOptions, MemorySource, MockBoundary, NoProgress, Orchestrator, Profile};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let source = MemorySource::new().with(
//!     "web",
//!     json!({
//!         "config": {"region": "eu"},
//!         "run": {"deploy": {"_command": "deploy", "_scopes": {"env": ["dev", "prod"]}, "region": "@{region}"}}
//!     }),
//! );
//! let profile = Profile::load(&source, "web", false).unwrap();
//!
//! let boundary = MockBoundary::new();
//! let report = Orchestrator::new(Arc::new(boundary.clone()))
//!     .provision(&profile, &ApplyOptions::default(), &mut NoProgress)
//!     .unwrap();
//!
//! assert!(report.is_success());
//! assert_eq!(boundary.commands(), vec!["config save", "deploy", "deploy"]);
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`CommandBoundary`]: Performs the effects units ask for
//! - [`ProfileSource`]: Supplies profile documents
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks, transports or storage.

pub mod boundary;
pub mod component;
pub mod components;
pub mod context;
pub mod directive;
pub mod document;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod scope;
pub mod types;

// Re-export main types at crate root
pub use boundary::{CommandBoundary, CommandResult, MockBoundary};
pub use component::{BoxedComponent, Component};
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, Runtime, UnitContext,
};
pub use directive::Parsed;
pub use document::{DirectorySource, MemorySource, Profile, ProfileSource, deep_merge};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{ExecutionResult, Executor, ItemError};
pub use orchestrator::{Failure, Orchestrator, Report, UnitReport};
pub use registry::{Registry, UnitDescriptor};
pub use types::{
    ApplyOptions, Declaration, DispatchRecord, Mode, OrderKey, Outcome, UnitSummary,
};
