//! # Pazar Testing
//!
//! In-memory test doubles shared across the workspace. The main export is
//! [`InMemoryEventBus`], a synchronous [`EventBus`] that records everything
//! published and can be told to fail specific topics, which is exactly what
//! outbox retry tests need.
//!
//! ## Example
//!
//! ```
//! use pazar_core::{EventBus, EventEnvelope};
//! use pazar_testing::InMemoryEventBus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = InMemoryEventBus::new();
//! let envelope = EventEnvelope::new("order.created", "order-1", &serde_json::json!({}))?;
//! bus.publish("order.created", &envelope).await?;
//!
//! assert_eq!(bus.published_on("order.created").len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use pazar_core::{EventBus, EventBusError, EventEnvelope, EventStream};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// In-memory event bus for tests.
///
/// Publishes synchronously into an internal log and fans out to live
/// subscribers over a broadcast channel. Clones share the same state, so a
/// test can hand one clone to the code under test and inspect the other.
#[derive(Clone)]
pub struct InMemoryEventBus {
    published: Arc<Mutex<Vec<(String, EventEnvelope)>>>,
    failing_topics: Arc<Mutex<HashSet<String>>>,
    fanout: broadcast::Sender<(String, EventEnvelope)>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (fanout, _) = broadcast::channel(1024);
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
            failing_topics: Arc::new(Mutex::new(HashSet::new())),
            fanout,
        }
    }

    /// Make every publish to `topic` fail until [`Self::heal_topic`] is
    /// called. Used to simulate broker outages in outbox tests.
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics
            .lock()
            .expect("lock poisoned")
            .insert(topic.to_string());
    }

    /// Stop failing publishes to `topic`.
    pub fn heal_topic(&self, topic: &str) {
        self.failing_topics
            .lock()
            .expect("lock poisoned")
            .remove(topic);
    }

    /// Everything published so far, in publish order, as `(topic, envelope)`.
    #[must_use]
    pub fn published(&self) -> Vec<(String, EventEnvelope)> {
        self.published.lock().expect("lock poisoned").clone()
    }

    /// Envelopes published to one topic, in publish order.
    #[must_use]
    pub fn published_on(&self, topic: &str) -> Vec<EventEnvelope> {
        self.published
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Forget everything published so far (test isolation).
    pub fn clear(&self) {
        self.published.lock().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();

        Box::pin(async move {
            if self
                .failing_topics
                .lock()
                .expect("lock poisoned")
                .contains(&topic)
            {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "injected failure".to_string(),
                });
            }

            self.published
                .lock()
                .expect("lock poisoned")
                .push((topic.clone(), event.clone()));

            // No subscribers is fine; the log is the source of truth.
            let _ = self.fanout.send((topic, event));
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        _group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let wanted: HashSet<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let mut rx = self.fanout.subscribe();

        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    match rx.recv().await {
                        Ok((topic, envelope)) => {
                            if wanted.contains(&topic) {
                                yield Ok(envelope);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            yield Err(EventBusError::TransportError(format!(
                                "subscriber lagged by {n} events"
                            )));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn envelope(event_type: &str, aggregate: &str) -> EventEnvelope {
        EventEnvelope::new(event_type, aggregate, &serde_json::json!({"n": 1}))
            .expect("json payload")
    }

    #[tokio::test]
    async fn records_published_events_in_order() {
        let bus = InMemoryEventBus::new();
        bus.publish("order.created", &envelope("order.created", "a"))
            .await
            .unwrap();
        bus.publish("order.paid", &envelope("order.paid", "a"))
            .await
            .unwrap();

        let log = bus.published();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, "order.created");
        assert_eq!(log[1].0, "order.paid");
    }

    #[tokio::test]
    async fn failing_topic_rejects_and_records_nothing() {
        let bus = InMemoryEventBus::new();
        bus.fail_topic("order.paid");

        let result = bus.publish("order.paid", &envelope("order.paid", "a")).await;
        assert!(result.is_err());
        assert!(bus.published_on("order.paid").is_empty());

        bus.heal_topic("order.paid");
        bus.publish("order.paid", &envelope("order.paid", "a"))
            .await
            .unwrap();
        assert_eq!(bus.published_on("order.paid").len(), 1);
    }

    #[tokio::test]
    async fn subscribers_only_see_their_topics() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus
            .subscribe(&["order.paid"], "test-group")
            .await
            .unwrap();

        bus.publish("order.created", &envelope("order.created", "a"))
            .await
            .unwrap();
        bus.publish("order.paid", &envelope("order.paid", "a"))
            .await
            .unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.event_type, "order.paid");
    }
}
