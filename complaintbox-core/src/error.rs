//! Error types for complaintbox-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the complaintbox-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input rejected at construction or at a write boundary.
    /// Records that fail validation are never written to disk.
    #[error("validation failed for {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Unknown complaint ID
    #[error("complaint not found: {id}")]
    NotFound { id: String },

    /// Disk or permission error, always tagged with the failing step
    #[error("IO error during {operation} on {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be decoded
    #[error("corrupt complaint record {}: {source}", path.display())]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A different agent already resolved this complaint
    #[error("complaint {id} already resolved by {resolved_by}")]
    AlreadyResolved { id: String, resolved_by: String },

    /// The caller cancelled the operation before it finished
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Repository-level context around a lower-level failure
    #[error("{operation}{} failed: {source}", id.as_deref().map(|id| format!(" {id}")).unwrap_or_default())]
    Context {
        operation: &'static str,
        id: Option<String>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap this error with the repository call that produced it.
    ///
    /// Cancellation passes through untouched so callers can tell it apart.
    pub(crate) fn within(self, operation: &'static str, id: Option<&str>) -> Self {
        match self {
            Error::Cancelled { .. } | Error::Context { .. } => self,
            other => Error::Context {
                operation,
                id: id.map(str::to_string),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through repository context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Error::Validation { .. })
    }

    pub fn is_already_resolved(&self) -> bool {
        matches!(self.root(), Error::AlreadyResolved { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled { .. })
    }
}

/// Result type alias for complaintbox-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_root_kind() {
        let err = Error::NotFound {
            id: "abc".to_string(),
        }
        .within("find_by_id", Some("abc"));

        assert!(err.is_not_found());
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "find_by_id abc failed: complaint not found: abc");
    }

    #[test]
    fn test_cancelled_is_not_wrapped() {
        let err = Error::Cancelled { operation: "scan" }.within("warm_cache", None);
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[test]
    fn test_io_error_names_operation_and_path() {
        let err = Error::io(
            "write",
            "/tmp/x.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("write"));
        assert!(rendered.contains("/tmp/x.json"));
    }
}
