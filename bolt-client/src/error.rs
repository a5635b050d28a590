//! Error types for the cluster client

use std::time::Duration;
use thiserror::Error;

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur when talking to the cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API server returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API server
        message: String,
    },

    /// Object not found
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// An object with the same name already exists
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    /// Failed to encode or decode an object
    #[error("Failed to parse object: {0}")]
    ParseError(String),

    /// Invalid request, rejected before reaching the server
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Watch stream broke
    #[error("Watch failed: {0}")]
    WatchError(String),
}

impl ClusterError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. }) || matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a name conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
            || matches!(self, Self::ApiError { status: 409, .. })
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

/// Errors returned while waiting for an object to reach a condition
///
/// Kept apart from [`ClusterError`] so callers can tell "the condition never
/// held" from "the cluster call failed".
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline passed before the condition held
    #[error("timed out after {after:?} waiting for '{name}'")]
    TimedOut { name: String, after: Duration },

    /// The caller cancelled the wait
    #[error("wait for '{name}' was cancelled")]
    Cancelled { name: String },

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl WaitError {
    /// Timeout or cancellation, as opposed to a cluster failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::Cancelled { .. })
    }
}
