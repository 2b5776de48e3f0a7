//! The event envelope: what actually travels over the bus.
//!
//! Every message published by a pazar service is an [`EventEnvelope`]: a
//! UTF-8 JSON payload plus the metadata the delivery contract is built on:
//! a stable `event_id` (consumer deduplication), an `event_type` (topic
//! routing), an `aggregate_id` (partition key, so events for one order stay
//! ordered) and the creation timestamp.
//!
//! Payloads are kept as raw JSON bytes at this layer. They are decoded into
//! strongly-typed structs (see [`crate::events`]) only at component
//! boundaries, so intermediate plumbing (outbox rows, bus adapters) never
//! needs to understand payload schemas.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while encoding or decoding envelope payloads.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize a payload to JSON.
    #[error("Failed to serialize event payload: {0}")]
    Serialization(String),

    /// Failed to deserialize a payload from JSON.
    #[error("Failed to deserialize event payload: {0}")]
    Deserialization(String),
}

/// A serialized event ready for publication.
///
/// The envelope is what the outbox stores and what the bus carries. The
/// `aggregate_id` doubles as the message key so that a partitioned bus keeps
/// per-aggregate ordering; `event_id` travels in message headers so consumers
/// can deduplicate redeliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// Unique id of this event. Consumers dedupe on this.
    pub event_id: Uuid,
    /// Event type, which is also the topic it is published to
    /// (e.g. `order.paid`).
    pub event_type: String,
    /// Id of the aggregate this event belongs to; used as the message key.
    pub aggregate_id: String,
    /// UTF-8 JSON payload.
    pub payload: Vec<u8>,
    /// When the event was created (outbox insertion time).
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an envelope with a fresh `event_id` from a serializable payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload cannot be encoded
    /// as JSON.
    pub fn new<T: Serialize>(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EventError> {
        let payload =
            serde_json::to_vec(payload).map_err(|e| EventError::Serialization(e.to_string()))?;
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            payload,
            occurred_at: Utc::now(),
        })
    }

    /// Reassemble an envelope from its stored or transported parts.
    #[must_use]
    pub fn from_parts(
        event_id: Uuid,
        event_type: String,
        aggregate_id: String,
        payload: Vec<u8>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            event_type,
            aggregate_id,
            payload,
            occurred_at,
        }
    }

    /// Decode the payload into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] if the payload is not valid
    /// JSON for `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| EventError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn envelope_round_trips_payload() {
        let sample = Sample {
            name: "kadikoy".to_string(),
            count: 3,
        };
        let envelope = EventEnvelope::new("order.created", "order-1", &sample).unwrap();

        assert_eq!(envelope.event_type, "order.created");
        assert_eq!(envelope.aggregate_id, "order-1");
        assert_eq!(envelope.decode::<Sample>().unwrap(), sample);
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let envelope =
            EventEnvelope::new("order.created", "order-1", &serde_json::json!({"x": 1})).unwrap();
        assert!(envelope.decode::<Sample>().is_err());
    }

    #[test]
    fn fresh_envelopes_get_distinct_ids() {
        let a = EventEnvelope::new("order.paid", "o", &serde_json::json!({})).unwrap();
        let b = EventEnvelope::new("order.paid", "o", &serde_json::json!({})).unwrap();
        assert_ne!(a.event_id, b.event_id);
    }
}
