//! Error type shared by the exporters.

use thiserror::Error;

/// Error from any observer.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// JSON serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The Prometheus registry or encoder failed.
    #[cfg(feature = "prometheus")]
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Encoded output was not UTF-8.
    #[error("utf8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A tally could not be turned into a metric.
    #[error("metric error: {0}")]
    Metric(String),
}

/// Result type for observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;
