//! The outbox row.

use chrono::{DateTime, Utc};
use pazar_core::EventEnvelope;
use serde::Serialize;
use uuid::Uuid;

/// A pending event in a service's `outbox_events` table.
///
/// Insert one of these in the same transaction as the aggregate change it
/// records; the publisher takes it from there.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    /// Event id; becomes the envelope's `event_id` header.
    pub id: Uuid,
    /// The aggregate this event belongs to; the message key.
    pub aggregate_id: Uuid,
    /// Event type, which is also the destination topic.
    pub event_type: String,
    /// Opaque JSON payload.
    pub event_data: serde_json::Value,
    /// Whether the publisher has delivered this event to the bus.
    pub published: bool,
    /// Insertion time; publication happens in this order per aggregate.
    pub created_at: DateTime<Utc>,
    /// When the event was marked published.
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Build an unpublished row from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized to JSON.
    pub fn new<T: Serialize>(
        aggregate_id: Uuid,
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_id,
            event_type: event_type.into(),
            event_data: serde_json::to_value(payload)?,
            published: false,
            created_at: Utc::now(),
            published_at: None,
        })
    }

    /// The envelope this row publishes as.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored JSON cannot be re-serialized, which
    /// would indicate a corrupted row.
    pub fn envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        Ok(EventEnvelope::from_parts(
            self.id,
            self.event_type.clone(),
            self.aggregate_id.to_string(),
            serde_json::to_vec(&self.event_data)?,
            self.created_at,
        ))
    }
}
