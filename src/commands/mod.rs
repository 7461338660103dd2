pub mod components;
pub mod export;
pub mod profile;
pub mod profiles;

use anyhow::{Context as _, Result};
use declarative::{ApplyOptions, CommandBoundary, DirectorySource, Executor};
use interpolate::VariableStore;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::boundary::{ProcessBoundary, Unconfigured};
use crate::cli::{ApplyArgs, OutputFormat};
use crate::paths;
use crate::schema::Settings;

/// Settings plus everything derived from them
pub struct Environment {
    pub settings: Settings,
}

impl Environment {
    /// Load settings from `config` or the default settings file
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let settings = match config {
            Some(path) => Settings::load_from(path)?,
            None => Settings::load()?,
        };
        Ok(Self { settings })
    }

    /// Profile documents from the configured roots
    pub fn source(&self) -> Result<DirectorySource> {
        Ok(DirectorySource::new(self.settings.profile_roots()?))
    }

    /// Executor with the state-dir lock directory
    pub fn executor(&self, jobs: usize) -> Result<Executor> {
        Ok(Executor::new(jobs)
            .with_lock_dir(paths::lock_dir()?)
            .with_poll_interval(Duration::from_millis(
                self.settings.execution.poll_interval_ms,
            )))
    }

    /// Command boundary; display-only runs work without one
    pub fn boundary(&self, display_only: bool) -> Result<Arc<dyn CommandBoundary>> {
        match ProcessBoundary::from_settings(&self.settings.boundary) {
            Some(boundary) => Ok(Arc::new(boundary)),
            None if display_only => Ok(Arc::new(Unconfigured)),
            None => anyhow::bail!(
                "No command boundary configured. Set [boundary] program in {} or use --display-only",
                paths::config_file()?.display()
            ),
        }
    }

    /// Runtime variables seeded from settings and `--set`
    pub fn variables(&self, overrides: &[(String, String)]) -> VariableStore {
        let store = VariableStore::with_values(
            self.settings
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        for (name, raw) in overrides {
            store.set(name.clone(), parse_value(raw));
        }
        store
    }

    /// Run options from CLI flags, falling back to settings
    pub fn apply_options(&self, args: &ApplyArgs) -> ApplyOptions {
        let execution = &self.settings.execution;
        ApplyOptions {
            display_only: args.display_only,
            ignore_missing: args.ignore_missing,
            jobs: args.jobs.unwrap_or(execution.jobs).max(1),
            components: args.components.clone(),
            exclude: args.exclude.clone(),
            lock_timeout: Duration::from_secs(args.lock_timeout.unwrap_or(execution.lock_timeout_secs)),
        }
    }
}

/// Parse a `--set` value as YAML, keeping it as text when that fails
pub fn parse_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Render a document for output
pub fn render(value: &impl serde::Serialize, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serde_yaml::to_string(value).context("Failed to render YAML"),
        OutputFormat::Json => serde_json::to_string_pretty(value).context("Failed to render JSON"),
    }
}
