//! Error types for courier operations.

use crate::types::AssignmentStatus;
use thiserror::Error;

/// Result type alias for courier operations.
pub type Result<T> = std::result::Result<T, CourierError>;

/// Error taxonomy for the courier service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CourierError {
    /// The referenced aggregate does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed or out-of-range input.
    #[error("{0}")]
    Validation(String),

    /// The order already has a live (pending or accepted) assignment.
    #[error("Order already has an active assignment")]
    AlreadyAssigned,

    /// The requested assignment status change is not allowed.
    #[error("Invalid assignment transition from {from} to {to}")]
    InvalidAssignmentTransition {
        /// Status the assignment is currently in.
        from: AssignmentStatus,
        /// Status that was requested.
        to: AssignmentStatus,
    },

    /// The per-courier location rate limit (1 update per 2 s) refused this
    /// update. The client may retry after the window.
    #[error("Location update rate limit exceeded")]
    RateLimitExceeded,

    /// The location ingestion queue is full; the update was dropped.
    #[error("Location update queue full")]
    QueueFull,

    /// Database failure; transient, retryable by the caller.
    #[error("Database error: {0}")]
    Database(String),

    /// Cache (Redis) failure; transient.
    #[error("Cache error: {0}")]
    Cache(String),

    /// An event payload could not be serialized.
    #[error("Event serialization error: {0}")]
    EventSerialization(String),
}

impl CourierError {
    /// Shorthand used by the stores to wrap `sqlx` failures with context.
    #[must_use]
    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Database(format!("{context}: {err}"))
    }

    /// Shorthand used by the cache to wrap Redis failures with context.
    #[must_use]
    pub fn cache(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Cache(format!("{context}: {err}"))
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        Self::EventSerialization(err.to_string())
    }
}
