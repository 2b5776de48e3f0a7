//! Error types for order operations.

use crate::types::OrderStatus;
use thiserror::Error;

/// Result type alias for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

/// Error taxonomy for the order service.
///
/// Variants map onto HTTP status codes at the handler boundary: validation
/// and invalid transitions are 400, missing aggregates 404, conflicts 409,
/// and infrastructure failures 500 (retryable by the caller).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderError {
    /// The cart has no items; an order cannot be created from it.
    #[error("Cart is empty")]
    EmptyCart,

    /// The cart holds items from more than one seller, or an item from a
    /// second seller was about to be added.
    #[error("Cart can only contain items from a single seller")]
    MultiSellerCart,

    /// The requested status change is not an edge in the transition graph.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Status the order is currently in.
        from: OrderStatus,
        /// Status that was requested.
        to: OrderStatus,
    },

    /// The referenced aggregate does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed or out-of-range input.
    #[error("{0}")]
    Validation(String),

    /// A uniqueness or concurrent-modification conflict.
    #[error("{0}")]
    Conflict(String),

    /// Database failure; transient, retryable by the caller.
    #[error("Database error: {0}")]
    Database(String),

    /// An event payload could not be serialized. Indicates a programming
    /// error rather than bad input.
    #[error("Event serialization error: {0}")]
    EventSerialization(String),
}

impl OrderError {
    /// Shorthand used by the stores to wrap `sqlx` failures with context.
    #[must_use]
    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Database(format!("{context}: {err}"))
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(err: serde_json::Error) -> Self {
        Self::EventSerialization(err.to_string())
    }
}
