//! Core types for profile application

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// A declaration mapping (or any payload forwarded to the command boundary).
pub type Declaration = Map<String, Value>;

/// Which phase an orchestrator run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Ensure every unit, ascending priority.
    Provisioning,
    /// Destroy every unit, descending priority.
    Destroying,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Destroying => write!(f, "destroying"),
        }
    }
}

/// Result of ensuring or destroying one unit instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// One or more ensure calls were issued
    Applied,
    /// One or more destroy calls were issued
    Removed,
    /// Nothing to do
    NoChange,
    /// The instance was not processed
    Skipped { reason: String },
}

impl Outcome {
    /// Shorthand for a skipped outcome.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Applied | Self::Removed)
    }
}

/// Per-unit-type counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub applied: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl UnitSummary {
    /// Total number of changes made
    pub fn total_changes(&self) -> usize {
        self.applied + self.removed
    }

    /// Check if every instance succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of instances processed
    pub fn total(&self) -> usize {
        self.applied + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &UnitSummary) {
        self.applied += other.applied;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
    }

    /// Count an outcome
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Applied => self.applied += 1,
            Outcome::Removed => self.removed += 1,
            Outcome::NoChange => self.no_change += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Count a failure
    pub fn add_failure(&mut self) {
        self.failed += 1;
    }
}

/// Options for one orchestrator run
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Resolve and journal every dispatch without calling the boundary
    pub display_only: bool,
    /// Skip unknown units, missing parents and unresolved references instead of aborting
    pub ignore_missing: bool,
    /// Worker threads per unit type
    pub jobs: usize,
    /// Restrict the run to these unit types (empty = all)
    pub components: Vec<String>,
    /// Unit types to leave out
    pub exclude: Vec<String>,
    /// Timeout for named locks taken by units
    pub lock_timeout: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            display_only: false,
            ignore_missing: false,
            jobs: 4,
            components: Vec::new(),
            exclude: Vec::new(),
            lock_timeout: Duration::from_secs(600),
        }
    }
}

impl ApplyOptions {
    /// Whether a unit type is selected by the component filters.
    pub fn selects(&self, unit: &str) -> bool {
        (self.components.is_empty() || self.components.iter().any(|c| c == unit))
            && !self.exclude.iter().any(|c| c == unit)
    }
}

/// Position of a dispatch in a run: bucket, instance, then call sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderKey {
    pub bucket: usize,
    pub instance: usize,
    pub seq: usize,
}

/// One call issued (or previewed) across the command boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    #[serde(skip)]
    pub order: OrderKey,
    pub unit: String,
    pub instance: String,
    pub command: String,
    pub options: Declaration,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = UnitSummary::default();
        summary.add_outcome(&Outcome::Applied);
        summary.add_outcome(&Outcome::Removed);
        summary.add_outcome(&Outcome::NoChange);
        summary.add_outcome(&Outcome::skipped("display only"));
        summary.add_failure();

        assert_eq!(summary.total(), 5);
        assert_eq!(summary.total_changes(), 2);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_summary_merge() {
        let mut a = UnitSummary {
            applied: 1,
            ..Default::default()
        };
        let b = UnitSummary {
            applied: 2,
            failed: 1,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.applied, 3);
        assert_eq!(a.failed, 1);
    }

    #[test]
    fn test_options_select() {
        let opts = ApplyOptions {
            components: vec!["config".into(), "run".into()],
            exclude: vec!["run".into()],
            ..Default::default()
        };
        assert!(opts.selects("config"));
        assert!(!opts.selects("run"));
        assert!(!opts.selects("group"));
        assert!(ApplyOptions::default().selects("anything"));
    }

    #[test]
    fn test_order_key_sorting() {
        let mut keys = vec![
            OrderKey { bucket: 1, instance: 0, seq: 0 },
            OrderKey { bucket: 0, instance: 2, seq: 1 },
            OrderKey { bucket: 0, instance: 2, seq: 0 },
        ];
        keys.sort();
        assert_eq!(keys[0], OrderKey { bucket: 0, instance: 2, seq: 0 });
        assert_eq!(keys[2].bucket, 1);
    }
}
