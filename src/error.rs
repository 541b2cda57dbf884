//! Error types for the hivemirror library.

use thiserror::Error;

use crate::transport::RequestToken;

/// Main error type for hivemirror operations.
#[derive(Error, Debug)]
pub enum TreeError {
    /// Path was empty, whitespace-only, or had no usable segments.
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    /// No node exists at the given path.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Response arrived for a node that is not waiting on that request.
    #[error("Stale response for {path} ({token})")]
    StaleResponse { path: String, token: RequestToken },

    /// Fetch was invalidated before it completed.
    #[error("Fetch cancelled")]
    Cancelled,

    /// The transport reported that the remote listing failed.
    #[error("Transport failure for {path}: {reason}")]
    TransportFailure { path: String, reason: String },

    /// The cache actor is no longer running.
    #[error("Cache actor stopped")]
    ActorStopped,

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for hivemirror operations.
pub type Result<T> = std::result::Result<T, TreeError>;
