//! Error types for interpolation.
//!
//! Resolvers report what went wrong; the engine wraps the failure with the
//! key path where it happened so callers can point at the offending entry.

use thiserror::Error;

/// Result type alias for interpolation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving values.
#[derive(Debug, Error)]
pub enum Error {
    /// A `@{name}` reference that matches neither a local nor a runtime variable
    #[error("unresolved reference '{name}'")]
    UnresolvedReference {
        /// Full reference expression (variable name plus any path segments)
        name: String,
    },

    /// A `?{...}` conditional that could not be parsed or evaluated
    #[error("malformed condition '{expression}': {message}")]
    MalformedCondition {
        /// The raw conditional text
        expression: String,
        /// What was wrong with it
        message: String,
    },

    /// Resolution failed below a key path
    #[error("{source} at '{path}'")]
    At {
        /// Dotted path of the failing entry (e.g. `options.hosts.0`)
        path: String,
        /// Underlying failure
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the key path it occurred at.
    ///
    /// Paths are only attached once; an already located error is returned unchanged.
    pub fn at(self, path: &str) -> Self {
        match self {
            located @ Self::At { .. } => located,
            other if path.is_empty() => other,
            other => Self::At {
                path: path.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with location wrappers removed.
    pub fn root(&self) -> &Self {
        match self {
            Self::At { source, .. } => source.root(),
            other => other,
        }
    }

    /// Key path of the failing entry, if known.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::At { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Name of the unresolved reference, if that is what failed.
    pub fn missing_reference(&self) -> Option<&str> {
        match self.root() {
            Self::UnresolvedReference { name } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_wraps_once() {
        let err = Error::UnresolvedReference {
            name: "region".to_string(),
        }
        .at("a.b")
        .at("outer");

        assert_eq!(err.path(), Some("a.b"));
        assert_eq!(err.missing_reference(), Some("region"));
        assert_eq!(err.to_string(), "unresolved reference 'region' at 'a.b'");
    }

    #[test]
    fn test_at_empty_path_is_noop() {
        let err = Error::UnresolvedReference {
            name: "x".to_string(),
        }
        .at("");
        assert!(err.path().is_none());
    }
}
