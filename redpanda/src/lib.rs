//! Redpanda event bus implementation for the pazar services.
//!
//! Implements [`EventBus`] from `pazar-core` over rdkafka. Any
//! Kafka-compatible broker works (Redpanda, Apache Kafka, managed
//! equivalents); the services only depend on the protocol.
//!
//! # Message Layout
//!
//! - **Payload**: the envelope's UTF-8 JSON bytes, untouched
//! - **Key**: the envelope's `aggregate_id`, so a partitioned topic keeps
//!   per-aggregate ordering
//! - **Headers**: `event_id`, `event_type`, `created_at` (RFC 3339): the
//!   metadata consumers need for deduplication without parsing the payload
//!
//! # Example
//!
//! ```no_run
//! use pazar_core::{EventBus, EventEnvelope};
//! use pazar_redpanda::RedpandaEventBus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! let envelope = EventEnvelope::new("order.paid", "order-1", &serde_json::json!({}))?;
//! bus.publish("order.paid", &envelope).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use pazar_core::{EventBus, EventBusError, EventEnvelope, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

/// Kafka-compatible event bus.
///
/// Cheap to clone is not a goal here; the services hold it behind an
/// `Arc<dyn EventBus>`.
pub struct RedpandaEventBus {
    /// Producer for publishing events.
    producer: FutureProducer,
    /// Broker addresses, kept for creating consumers on subscribe.
    brokers: String,
    /// Producer send timeout.
    timeout: Duration,
    /// Where a fresh consumer group starts reading.
    offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for custom configuration.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Broker addresses this bus talks to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
    offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated broker addresses, e.g. `"localhost:9092"`.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` or `"all"`. Default `"1"`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Producer send timeout. Default 10 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Where a consumer group with no committed offset starts:
    /// `"latest"` (default; dispatch only cares about new orders) or
    /// `"earliest"`.
    #[must_use]
    pub fn offset_reset(mut self, reset: impl Into<String>) -> Self {
        self.offset_reset = Some(reset.into());
        self
    }

    /// Build the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are missing or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "10000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        tracing::info!(brokers = %brokers, "Redpanda event bus created");

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(10)),
            offset_reset: self.offset_reset.unwrap_or_else(|| "latest".to_string()),
        })
    }
}

/// Rebuild an [`EventEnvelope`] from a consumed Kafka message.
///
/// `event_id` is mandatory (it is what consumers dedupe on); the other
/// headers fall back to sensible values so one malformed producer does not
/// wedge a consumer group.
fn envelope_from_message(message: &rdkafka::message::BorrowedMessage<'_>) -> Result<EventEnvelope, EventBusError> {
    let payload = message
        .payload()
        .ok_or_else(|| EventBusError::DeserializationFailed("Message has no payload".to_string()))?
        .to_vec();

    let mut event_id = None;
    let mut event_type = None;
    let mut created_at = None;

    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            let Some(value) = header.value else { continue };
            let Ok(value) = std::str::from_utf8(value) else { continue };
            match header.key {
                "event_id" => event_id = Uuid::parse_str(value).ok(),
                "event_type" => event_type = Some(value.to_string()),
                "created_at" => {
                    created_at = DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|t| t.with_timezone(&Utc));
                }
                _ => {}
            }
        }
    }

    let event_id = event_id.ok_or_else(|| {
        EventBusError::DeserializationFailed("Message is missing an event_id header".to_string())
    })?;

    let aggregate_id = message
        .key()
        .map(|k| String::from_utf8_lossy(k).into_owned())
        .unwrap_or_default();

    Ok(EventEnvelope::from_parts(
        event_id,
        event_type.unwrap_or_else(|| message.topic().to_string()),
        aggregate_id,
        payload,
        created_at.unwrap_or_else(Utc::now),
    ))
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let event_id = event.event_id.to_string();
            let created_at = event.occurred_at.to_rfc3339();

            let headers = OwnedHeaders::new()
                .insert(Header {
                    key: "event_id",
                    value: Some(event_id.as_bytes()),
                })
                .insert(Header {
                    key: "event_type",
                    value: Some(event.event_type.as_bytes()),
                })
                .insert(Header {
                    key: "created_at",
                    value: Some(created_at.as_bytes()),
                });

            let record = FutureRecord::to(&topic)
                .payload(&event.payload)
                .key(event.aggregate_id.as_bytes())
                .headers(headers);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        event_id = %event_id,
                        event_type = %event.event_type,
                        "Event published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        event_id = %event_id,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let group = group.to_string();
        let brokers = self.brokers.clone();
        let offset_reset = self.offset_reset.clone();

        Box::pin(async move {
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "true")
                .set("auto.offset.reset", &offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe: {e}"),
                })?;

            tracing::info!(topics = ?topics, consumer_group = %group, "Subscribed to topics");

            // The StreamConsumer is not Sync, so a task owns it and forwards
            // envelopes over a channel.
            let (tx, rx) = tokio::sync::mpsc::channel(100);

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();
                while let Some(msg_result) = stream.next().await {
                    let event_result = match msg_result {
                        Ok(message) => envelope_from_message(&message),
                        Err(e) => Err(EventBusError::TransportError(format!(
                            "Failed to receive message: {e}"
                        ))),
                    };

                    if tx.send(event_result).await.is_err() {
                        break; // Receiver dropped.
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn builder_requires_brokers() {
        assert!(RedpandaEventBus::builder().build().is_err());
    }
}
