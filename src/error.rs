//! Crate error taxonomy.
//!
//! Every failure the CLI can report funnels into [`Error`]. Backend failures
//! keep the provider's diagnostic intact so the operator sees it verbatim.

use crate::backend::BackendError;
use thiserror::Error;

/// Errors raised while loading, building, planning or applying a stack.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure with the offending path.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML or JSON could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation of `stack.yaml` failed.
    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<String>),

    /// The built topology violates a network invariant.
    #[error("{} invariant violation(s)", .0.len())]
    Invariant(Vec<String>),

    /// A `{{...}}` template could not be resolved.
    #[error("template error: {0}")]
    Template(String),

    /// Resource references form a cycle or point nowhere.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// Lock file is unreadable or inconsistent.
    #[error("state error: {0}")]
    State(String),

    /// The provisioning backend rejected a resource. Fatal to the run.
    #[error("{resource}: {source}")]
    Backend {
        resource: String,
        #[source]
        source: BackendError,
    },

    /// Drift findings in tripwire mode.
    #[error("{0} drift finding(s)")]
    Drift(usize),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Individual messages carried by multi-error variants.
    pub fn details(&self) -> &[String] {
        match self {
            Self::Validation(errs) | Self::Invariant(errs) => errs,
            _ => &[],
        }
    }
}

impl From<serde_yaml_ng::Error> for Error {
    fn from(err: serde_yaml_ng::Error) -> Self {
        Self::Parse(format!("YAML: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(format!("JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_validation_display_counts() {
        let e = Error::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(e.to_string(), "2 validation error(s)");
        assert_eq!(e.details().len(), 2);
    }

    #[test]
    fn test_error_backend_keeps_provider_message() {
        let e = Error::Backend {
            resource: "webserver-vpc".into(),
            source: BackendError::Conflict("name webserver-vpc already exists".into()),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("webserver-vpc: "));
        assert!(msg.contains("already exists"));
    }

    #[test]
    fn test_error_from_yaml() {
        let err = serde_yaml_ng::from_str::<u32>("[oops").unwrap_err();
        let e: Error = err.into();
        assert!(matches!(e, Error::Parse(_)));
    }
}
