//! Profile orchestrator - plans, buckets and applies profile documents
//!
//! A run goes through three steps:
//! 1. Plan: select unit types, reject unknown ones and validate every
//!    instance. Nothing is dispatched if planning fails.
//! 2. Bucket: walk unit types in priority order (ascending to provision,
//!    descending to destroy) and hand each bucket's instances to the executor.
//! 3. Settle: record outcomes, stop after a bucket whose errors abort the run.

use crate::boundary::CommandBoundary;
use crate::component::Component;
use crate::context::{ConfirmCallback, ProgressCallback, Runtime, UnitContext};
use crate::document::Profile;
use crate::error::{Error, ErrorCategory, Result};
use crate::executor::Executor;
use crate::registry::Registry;
use crate::types::{ApplyOptions, Declaration, DispatchRecord, Mode, Outcome, UnitSummary};
use chrono::{DateTime, Utc};
use interpolate::{Interpolator, VariableStore, escape_text};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One failed instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub unit: String,
    pub instance: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl Failure {
    fn new(unit: &str, instance: &str, error: &Error) -> Self {
        let (unit, instance) = error.instance().unwrap_or((unit, instance));
        Self {
            unit: unit.to_string(),
            instance: instance.to_string(),
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// Counts for one unit type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub unit: String,
    pub priority: i32,
    pub summary: UnitSummary,
}

/// Result of one provisioning or destroying run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub profile: String,
    pub mode: Mode,
    pub display_only: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Unit types in the order they ran
    pub units: Vec<UnitReport>,
    /// Every dispatch issued or previewed, in run order
    pub dispatches: Vec<DispatchRecord>,
    /// Every failed instance
    pub failures: Vec<Failure>,
    /// Unit types and instances passed over because of `ignore_missing`
    pub skipped: Vec<String>,
    /// Why the run stopped early
    pub aborted: Option<String>,
    /// The user declined the confirmation prompt
    pub cancelled: bool,
}

impl Report {
    fn new(profile: &str, mode: Mode, display_only: bool) -> Self {
        Self {
            profile: profile.to_string(),
            mode,
            display_only,
            started_at: Utc::now(),
            finished_at: None,
            units: Vec::new(),
            dispatches: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            aborted: None,
            cancelled: false,
        }
    }

    /// Check if the run completed without failures
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }

    /// Counts summed over every unit type
    pub fn totals(&self) -> UnitSummary {
        let mut totals = UnitSummary::default();
        for unit in &self.units {
            totals.merge(&unit.summary);
        }
        totals
    }

    /// Wall-clock duration of the run
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// Record a failed instance and decide whether it stops the run.
    fn settle(
        &mut self,
        unit: &str,
        instance: &str,
        error: &Error,
        summary: &mut UnitSummary,
        ignore_missing: bool,
    ) {
        if ignore_missing && error.category() == ErrorCategory::Resolution {
            log::warn!("Skipping {} '{}': {}", unit, instance, error);
            summary.skipped += 1;
            self.skipped.push(format!("{unit} '{instance}'"));
            return;
        }

        log::error!("{} '{}' failed: {}", unit, instance, error);
        summary.add_failure();
        if error.aborts_run(ignore_missing) && self.aborted.is_none() {
            self.aborted = Some(format!("{}: {}", error.category(), error));
        }
        self.failures.push(Failure::new(unit, instance, error));
    }
}

/// Unit type selected for a run with its instance section
struct PlannedUnit<'a> {
    component: &'a dyn Component,
    section: Declaration,
}

/// Applies profiles through the registry, executor and command boundary
pub struct Orchestrator {
    registry: Registry,
    boundary: Arc<dyn CommandBoundary>,
    variables: Arc<VariableStore>,
    interpolator: Interpolator,
    executor: Executor,
}

impl Orchestrator {
    /// Create an orchestrator over the built-in units
    pub fn new(boundary: Arc<dyn CommandBoundary>) -> Self {
        Self {
            registry: Registry::builtin(),
            boundary,
            variables: Arc::new(VariableStore::new()),
            interpolator: Interpolator::standard(),
            executor: Executor::default(),
        }
    }

    /// Replace the unit registry
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Share a runtime variable store
    #[must_use]
    pub fn with_variables(mut self, variables: Arc<VariableStore>) -> Self {
        self.variables = variables;
        self
    }

    /// Replace the interpolation engine
    #[must_use]
    pub fn with_interpolator(mut self, interpolator: Interpolator) -> Self {
        self.interpolator = interpolator;
        self
    }

    /// Replace the executor
    #[must_use]
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Registered unit types
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runtime variable store
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Executor (also provides named locks)
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Ensure every declared instance, lowest priority first.
    pub fn provision(
        &self,
        profile: &Profile,
        opts: &ApplyOptions,
        progress: &mut dyn ProgressCallback,
    ) -> Result<Report> {
        self.run(profile, opts, Mode::Provisioning, progress, None)
    }

    /// Destroy every declared instance, highest priority first.
    ///
    /// Asks `confirm` once planning succeeds (not in display-only mode); a
    /// declined prompt returns a cancelled report without dispatching.
    pub fn destroy(
        &self,
        profile: &Profile,
        opts: &ApplyOptions,
        progress: &mut dyn ProgressCallback,
        confirm: &mut dyn ConfirmCallback,
    ) -> Result<Report> {
        self.run(profile, opts, Mode::Destroying, progress, Some(confirm))
    }

    /// Rebuild a profile document from a live-state snapshot.
    ///
    /// The snapshot maps unit type names to `{instance name: live instance}`.
    /// Units that cannot describe themselves are left out.
    pub fn export(&self, snapshot: &Value) -> Result<Value> {
        let Value::Object(snapshot) = snapshot else {
            return Err(Error::declaration("", "", "", "snapshot must be a mapping of unit types"));
        };

        for unit in snapshot.keys() {
            self.registry.require(unit)?;
        }

        let mut document = Declaration::new();
        for component in self.registry.ordered(Mode::Provisioning) {
            let Some(instances) = snapshot.get(component.name()) else {
                continue;
            };
            if component.skip_describe() {
                log::debug!("Unit '{}' does not describe itself, leaving it out", component.name());
                continue;
            }
            let Value::Object(instances) = instances else {
                return Err(Error::declaration(
                    component.name(),
                    "",
                    "",
                    format!("snapshot section must be a mapping, got {instances}"),
                ));
            };

            let mut section = Declaration::new();
            for (name, instance) in instances {
                section.insert(escape_text(name), component.describe(instance)?);
            }
            document.insert(component.name().to_string(), Value::Object(section));
        }

        Ok(Value::Object(document))
    }

    fn run(
        &self,
        profile: &Profile,
        opts: &ApplyOptions,
        mode: Mode,
        progress: &mut dyn ProgressCallback,
        confirm: Option<&mut dyn ConfirmCallback>,
    ) -> Result<Report> {
        let mut report = Report::new(profile.name(), mode, opts.display_only);
        log::info!(
            "{} profile '{}'{}",
            mode,
            profile.name(),
            if opts.display_only { " (display only)" } else { "" }
        );

        let planned = match self.plan(profile, opts, mode, &mut report) {
            Ok(planned) => planned,
            Err(errors) => {
                for error in &errors {
                    report.settle("", "", error, &mut UnitSummary::default(), opts.ignore_missing);
                }
                return Ok(report.finish());
            }
        };

        if let Some(confirm) = confirm
            && !opts.display_only
        {
            let prompt = format!(
                "Destroy {} unit type(s) declared by profile '{}'?",
                planned.len(),
                profile.name()
            );
            let confirmed = confirm
                .confirm(&prompt)
                .map_err(|e| Error::Confirm(format!("{e:#}")))?;
            if !confirmed {
                log::info!("Destroy of '{}' cancelled", profile.name());
                report.cancelled = true;
                return Ok(report.finish());
            }
        }

        let runtime = Runtime::new(
            self.boundary.as_ref(),
            &self.variables,
            &self.interpolator,
            &self.executor,
        )
        .display_only(opts.display_only)
        .lock_timeout(opts.lock_timeout);

        for (bucket, unit) in planned.iter().enumerate() {
            self.run_bucket(&runtime, bucket, unit, opts, mode, progress, &mut report);
            if let Some(reason) = &report.aborted {
                log::warn!("Stopping after '{}': {}", unit.component.name(), reason);
                break;
            }
        }

        report.dispatches = runtime.dispatches();
        Ok(report.finish())
    }

    /// Select unit types and validate every instance, collecting all problems.
    fn plan(
        &self,
        profile: &Profile,
        opts: &ApplyOptions,
        mode: Mode,
        report: &mut Report,
    ) -> std::result::Result<Vec<PlannedUnit<'_>>, Vec<Error>> {
        let mut errors = Vec::new();
        let mut sections: BTreeMap<&str, Declaration> = BTreeMap::new();

        for (unit, section) in profile.document() {
            if !opts.selects(unit) {
                log::debug!("Unit '{}' filtered out", unit);
                continue;
            }
            if !self.registry.contains(unit) {
                if opts.ignore_missing {
                    log::warn!("Unknown unit type '{}', skipping", unit);
                    report.skipped.push(unit.clone());
                } else {
                    errors.push(Error::UnknownUnit { name: unit.clone() });
                }
                continue;
            }
            match section {
                Value::Null => {
                    sections.insert(unit.as_str(), Declaration::new());
                }
                Value::Object(instances) => {
                    sections.insert(unit.as_str(), instances.clone());
                }
                other => errors.push(Error::declaration(
                    unit.as_str(),
                    "",
                    "",
                    format!("section must be a mapping of instances, got {other}"),
                )),
            }
        }

        let mut planned = Vec::new();
        for component in self.registry.ordered(mode) {
            let Some(section) = sections.remove(component.name()) else {
                continue;
            };
            if component.skip_run() {
                log::debug!("Unit '{}' opts out of {}", component.name(), mode);
                continue;
            }
            for (instance, declaration) in &section {
                if let Err(e) = component.validate(instance, declaration) {
                    errors.push(e);
                }
            }
            planned.push(PlannedUnit { component, section });
        }

        if errors.is_empty() {
            Ok(planned)
        } else {
            Err(errors)
        }
    }

    /// Resolve instance names for one unit type and run its instances.
    #[allow(clippy::too_many_arguments)]
    fn run_bucket(
        &self,
        runtime: &Runtime<'_>,
        bucket: usize,
        planned: &PlannedUnit<'_>,
        opts: &ApplyOptions,
        mode: Mode,
        progress: &mut dyn ProgressCallback,
        report: &mut Report,
    ) {
        let component = planned.component;
        let unit = component.name();
        let mut summary = UnitSummary::default();

        let mut names: Vec<String> = Vec::new();
        let mut items: Vec<(usize, Value)> = Vec::new();
        let mut seen = HashSet::new();
        let ctx = runtime.interpolation_context();
        for (key, declaration) in &planned.section {
            let entries = match self.interpolator.resolve_key(key, declaration.clone(), &ctx) {
                Ok(entries) => entries,
                Err(source) => {
                    let error = Error::Resolution {
                        unit: unit.to_string(),
                        instance: key.clone(),
                        source,
                    };
                    report.settle(unit, key, &error, &mut summary, opts.ignore_missing);
                    continue;
                }
            };
            for (name, declaration) in entries {
                if !seen.insert(name.clone()) {
                    let error = Error::declaration(unit, name.as_str(), "", "instance name declared twice");
                    report.settle(unit, &name, &error, &mut summary, opts.ignore_missing);
                    continue;
                }
                items.push((names.len(), declaration));
                names.push(name);
            }
        }

        if report.aborted.is_none() {
            progress.on_bucket_start(unit, items.len());
            let jobs = if component.can_parallelize() { opts.jobs } else { 1 };
            log::debug!("Running {} '{}' instance(s) with {} job(s)", items.len(), unit, jobs);

            let batch = self.executor.run_with(jobs, items, |(index, declaration)| {
                let ctx = UnitContext::new(runtime, unit, &names[*index], bucket, *index);
                let outcome = match mode {
                    Mode::Provisioning => component.ensure(&ctx, declaration)?,
                    Mode::Destroying => component.destroy(&ctx, declaration)?,
                };
                Ok((*index, outcome))
            });

            match batch {
                Ok(batch) => {
                    let mut settled: Vec<(usize, Result<Outcome>)> = batch
                        .data
                        .into_iter()
                        .map(|(index, outcome)| (index, Ok(outcome)))
                        .chain(batch.errors.into_iter().map(|e| (e.item.0, Err(e.error))))
                        .collect();
                    settled.sort_by_key(|(index, _)| *index);

                    for (index, result) in settled {
                        let name = &names[index];
                        progress.on_instance_complete(unit, name, &result);
                        match result {
                            Ok(outcome) => summary.add_outcome(&outcome),
                            Err(error) => report.settle(unit, name, &error, &mut summary, opts.ignore_missing),
                        }
                    }
                }
                Err(error) => report.settle(unit, "", &error, &mut summary, opts.ignore_missing),
            }
            progress.on_bucket_complete(unit);
        }

        report.units.push(UnitReport {
            unit: unit.to_string(),
            priority: component.priority(),
            summary,
        });
    }
}
