//! Event bus abstraction for cross-service communication.
//!
//! Events flow from each service's transactional outbox through the bus to
//! downstream consumers (the courier dispatcher consumes `order.paid`, the
//! notification and tracking services consume the rest).
//!
//! # Key Principles
//!
//! - **Database first**: events are persisted to the outbox before they ever
//!   reach the bus; the bus is distribution, not the source of truth
//! - **At-least-once delivery**: consumers may see duplicates and must
//!   dedupe on `event_id`
//! - **Ordered within a key**: events sharing an `aggregate_id` are published
//!   in creation order; no ordering is promised across aggregates
//!
//! # Implementations
//!
//! - `pazar_redpanda::RedpandaEventBus`: Kafka-compatible, for production
//! - `pazar_testing::InMemoryEventBus`: synchronous, for tests

use crate::event::EventEnvelope;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to subscribe to topics.
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe.
        topics: Vec<String>,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to decode an incoming message into an envelope.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error.
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of envelopes from a subscription.
///
/// Each item is a `Result`: transport and decode errors are surfaced in-band
/// so a consumer loop can log and keep reading.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so the
/// bus can be held as `Arc<dyn EventBus>` by the outbox publisher and the
/// consumer loops.
pub trait EventBus: Send + Sync {
    /// Publish an envelope to a topic.
    ///
    /// The envelope's `aggregate_id` is used as the message key and its
    /// `event_id`, `event_type` and `occurred_at` travel as message headers.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish fails; the
    /// caller (the outbox publisher) leaves the event unpublished and
    /// retries on its next tick.
    fn publish(
        &self,
        topic: &str,
        event: &EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics as a member of `group`.
    ///
    /// Consumer groups share the workload between instances of the same
    /// subscriber; each group receives its own copy of every event.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
        group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
