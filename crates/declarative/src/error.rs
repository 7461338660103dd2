//! Error types for profile application.
//!
//! Errors are categorized so the orchestrator can decide whether a failure
//! aborts the whole application or is recorded against one instance.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for declarative operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of declarative errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The profile document is invalid (missing directive, bad scope spec, unknown unit).
    Declaration,
    /// A reference or conditional could not be resolved.
    Resolution,
    /// The command boundary reported a failure.
    Dispatch,
    /// A named lock could not be acquired.
    Lock,
    /// A profile document could not be found or parsed.
    Load,
    /// Engine failure (worker panic, thread pool).
    Internal,
}

impl ErrorCategory {
    /// Whether errors of this category abort the whole profile application.
    ///
    /// Resolution errors are fatal unless the caller asked to ignore missing
    /// references, in which case only the failing instance is skipped.
    #[must_use]
    pub fn aborts_run(&self, ignore_missing: bool) -> bool {
        match self {
            Self::Declaration | Self::Lock | Self::Load | Self::Internal => true,
            Self::Resolution => !ignore_missing,
            Self::Dispatch => false,
        }
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Declaration => "Invalid declaration",
            Self::Resolution => "Unresolved value",
            Self::Dispatch => "Command failed",
            Self::Lock => "Lock contention",
            Self::Load => "Profile could not be loaded",
            Self::Internal => "Internal error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Declaration => "Fix the profile document and run again",
            Self::Resolution => "Define the referenced variable or pass --ignore-missing",
            Self::Dispatch => "Check the command output above; other instances were still applied",
            Self::Lock => "Another process holds the lock; wait for it or raise --lock-timeout",
            Self::Load => "Check the profile name and the configured profile paths",
            Self::Internal => "Re-run with -vvv and report the log",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while loading or applying a profile.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A declaration is structurally invalid.
    #[error("{unit} '{instance}': {message} ({directive})")]
    Declaration {
        /// Unit type name.
        unit: String,
        /// Instance name.
        instance: String,
        /// Directive or key at fault.
        directive: String,
        /// What is wrong.
        message: String,
    },

    /// The document names a unit type that is not registered.
    #[error("unknown unit type '{name}'")]
    UnknownUnit {
        /// Unit type name.
        name: String,
    },

    /// A unit type was registered twice.
    #[error("unit type '{name}' is already registered")]
    DuplicateUnit {
        /// Unit type name.
        name: String,
    },

    /// Interpolation failed for an instance.
    #[error("{unit} '{instance}': {source}")]
    Resolution {
        /// Unit type name.
        unit: String,
        /// Instance name.
        instance: String,
        /// Underlying interpolation failure (carries the key path).
        #[source]
        source: interpolate::Error,
    },

    /// The command boundary reported a failure.
    #[error("{unit} '{instance}': command '{command}' failed: {}", errors.join("; "))]
    Dispatch {
        /// Unit type name.
        unit: String,
        /// Instance name.
        instance: String,
        /// Command that failed.
        command: String,
        /// Error payload reported by the boundary, unmodified.
        errors: Vec<String>,
    },

    /// A named lock was not acquired before the timeout.
    #[error("timed out after {timeout:?} waiting for lock '{name}'")]
    LockTimeout {
        /// Lock name.
        name: String,
        /// How long we waited.
        timeout: Duration,
    },

    /// The lock file itself could not be opened.
    #[error("cannot open lock '{name}': {source}")]
    Lock {
        /// Lock name.
        name: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// No document exists for a profile name.
    #[error("profile '{name}' not found")]
    ProfileNotFound {
        /// Profile name.
        name: String,
    },

    /// Parent profiles form a cycle or nest too deeply.
    #[error("invalid parent chain: {chain}")]
    ParentChain {
        /// Rendered chain, e.g. `a -> b -> a`.
        chain: String,
    },

    /// A profile document could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// IO error while reading documents.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A unit does not implement an optional operation.
    #[error("unit '{unit}' does not support {operation}")]
    Unsupported {
        /// Unit type name.
        unit: String,
        /// Operation name.
        operation: &'static str,
    },

    /// The worker pool could not be built.
    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),

    /// A worker panicked while processing an item.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// The confirmation prompt failed.
    #[error("confirmation failed: {0}")]
    Confirm(String),
}

impl Error {
    /// Create a declaration error.
    pub fn declaration(
        unit: impl Into<String>,
        instance: impl Into<String>,
        directive: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Declaration {
            unit: unit.into(),
            instance: instance.into(),
            directive: directive.into(),
            message: message.into(),
        }
    }

    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Declaration { .. } | Self::UnknownUnit { .. } | Self::DuplicateUnit { .. } => {
                ErrorCategory::Declaration
            }
            Self::Resolution { .. } => ErrorCategory::Resolution,
            Self::Dispatch { .. } | Self::Unsupported { .. } => ErrorCategory::Dispatch,
            Self::LockTimeout { .. } | Self::Lock { .. } => ErrorCategory::Lock,
            Self::ProfileNotFound { .. }
            | Self::ParentChain { .. }
            | Self::Parse { .. }
            | Self::Io { .. } => ErrorCategory::Load,
            Self::ThreadPool(_) | Self::Panicked(_) | Self::Confirm(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error aborts the whole profile application.
    #[must_use]
    pub fn aborts_run(&self, ignore_missing: bool) -> bool {
        self.category().aborts_run(ignore_missing)
    }

    /// Unit type name and instance name, when the error is tied to one instance.
    pub fn instance(&self) -> Option<(&str, &str)> {
        match self {
            Self::Declaration { unit, instance, .. }
            | Self::Resolution { unit, instance, .. }
            | Self::Dispatch { unit, instance, .. } => Some((unit, instance)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_abort_policy() {
        assert!(ErrorCategory::Declaration.aborts_run(true));
        assert!(ErrorCategory::Lock.aborts_run(true));
        assert!(ErrorCategory::Resolution.aborts_run(false));
        assert!(!ErrorCategory::Resolution.aborts_run(true));
        assert!(!ErrorCategory::Dispatch.aborts_run(false));
    }

    #[test]
    fn test_category_text() {
        assert!(!ErrorCategory::Dispatch.description().is_empty());
        assert!(ErrorCategory::Lock.advice().contains("lock"));
        assert_eq!(format!("{}", ErrorCategory::Load), "Profile could not be loaded");
    }

    #[test]
    fn test_declaration_display() {
        let err = Error::declaration("run", "job1", "_task", "needs one of _task, _command, _config");
        assert_eq!(err.category(), ErrorCategory::Declaration);
        let display = err.to_string();
        assert!(display.contains("run 'job1'"));
        assert!(display.contains("_task"));
        assert_eq!(err.instance(), Some(("run", "job1")));
    }

    #[test]
    fn test_dispatch_keeps_payload() {
        let err = Error::Dispatch {
            unit: "config".to_string(),
            instance: "a".to_string(),
            command: "config save".to_string(),
            errors: vec!["denied".to_string(), "retry later".to_string()],
        };
        assert!(!err.aborts_run(false));
        assert!(err.to_string().ends_with("denied; retry later"));
    }

    #[test]
    fn test_resolution_names_reference() {
        let err = Error::Resolution {
            unit: "run".to_string(),
            instance: "job".to_string(),
            source: interpolate::Error::UnresolvedReference {
                name: "missing_name".to_string(),
            }
            .at("_command"),
        };
        assert_eq!(err.category(), ErrorCategory::Resolution);
        assert!(err.to_string().contains("missing_name"));
        assert!(err.to_string().contains("_command"));
    }

    #[test]
    fn test_lock_timeout_is_distinct() {
        let err = Error::LockTimeout {
            name: "bootstrap".to_string(),
            timeout: Duration::from_millis(50),
        };
        assert_eq!(err.category(), ErrorCategory::Lock);
        assert!(err.to_string().contains("bootstrap"));
    }
}
