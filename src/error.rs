//! Error type shared by the storage, store and protocol layers.
//!
//! Every variant here is recoverable from the page's point of view: the
//! identity provider, the view counter protocol and the live counter all
//! catch these at their call sites, log them, and fall back to a default.
//! The `try_*` entry points surface them for callers that want to know.

use thiserror::Error;

/// Unified error type for visitor counting.
#[derive(Debug, Error)]
pub enum VisitError {
    /// Local key-value storage cannot be used at all.
    #[error("local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// I/O failure in a file-backed component.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session never became ready.
    #[error("session failed: {0}")]
    Session(String),

    /// A read or write against the document store failed.
    #[error("store error: {0}")]
    Store(String),

    /// A change subscription reported an error.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// A document exists but does not have the expected shape.
    #[error("malformed document at {path}: {reason}")]
    MalformedDocument {
        /// Path of the offending document.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration value could not be understood.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A document path could not be parsed.
    #[error("invalid document path: {0:?}")]
    InvalidPath(String),
}

/// Result type for visitor counting operations.
pub type Result<T> = std::result::Result<T, VisitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = VisitError::Store("permission denied".into());
        assert_eq!(err.to_string(), "store error: permission denied");

        let err = VisitError::MalformedDocument {
            path: "viewCounts/profile".into(),
            reason: "count is not an integer".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed document at viewCounts/profile: count is not an integer"
        );
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: VisitError = io.into();
        assert!(matches!(err, VisitError::Io(_)));
    }

    #[test]
    fn test_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: VisitError = json_err.into();
        assert!(err.to_string().starts_with("json error:"));
    }
}
