//! The publisher loop and the retention janitor.

use crate::store::OutboxStore;
use pazar_core::EventBus;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Background loop publishing outbox events to the bus.
///
/// Single writer per outbox table per process; horizontal scale comes from
/// partitioning aggregates across processes, not from concurrent publishers.
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    interval: Duration,
    batch_size: i64,
}

impl OutboxPublisher {
    /// Create a publisher ticking every `interval`, draining up to
    /// `batch_size` events per tick.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        bus: Arc<dyn EventBus>,
        interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            bus,
            interval,
            batch_size,
        }
    }

    /// Run one tick: fetch, publish, mark. Returns how many events were
    /// published.
    ///
    /// Failures never escape: a failing event leaves its aggregate blocked
    /// for this tick (publishing its later events now would break per-order
    /// ordering) and everything unpublished is retried next tick.
    pub async fn run_once(&self) -> usize {
        let events = match self.store.fetch_unpublished(self.batch_size).await {
            Ok(events) => events,
            Err(err) => {
                error!(error = %err, "Failed to fetch unpublished outbox events");
                return 0;
            }
        };

        if events.is_empty() {
            return 0;
        }

        debug!(count = events.len(), "Processing outbox events");

        let mut blocked_aggregates: HashSet<Uuid> = HashSet::new();
        let mut published_ids: Vec<Uuid> = Vec::new();

        for event in &events {
            if blocked_aggregates.contains(&event.aggregate_id) {
                continue;
            }

            let envelope = match event.envelope() {
                Ok(envelope) => envelope,
                Err(err) => {
                    error!(
                        event_id = %event.id,
                        error = %err,
                        "Corrupt outbox row, blocking aggregate"
                    );
                    blocked_aggregates.insert(event.aggregate_id);
                    continue;
                }
            };

            match self.bus.publish(&event.event_type, &envelope).await {
                Ok(()) => published_ids.push(event.id),
                Err(err) => {
                    warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        aggregate_id = %event.aggregate_id,
                        error = %err,
                        "Publish failed, event stays in outbox for retry"
                    );
                    blocked_aggregates.insert(event.aggregate_id);
                }
            }
        }

        if !published_ids.is_empty() {
            match self.store.mark_published(&published_ids).await {
                Ok(()) => debug!(count = published_ids.len(), "Outbox events published"),
                Err(err) => {
                    // The events went out but stay marked unpublished, so
                    // they will be redelivered. At-least-once allows this.
                    error!(error = %err, "Failed to mark outbox events published");
                }
            }
        }

        published_ids.len()
    }

    /// Spawn the publisher loop. Stops when `shutdown` fires, finishing the
    /// in-flight tick first.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                batch_size = self.batch_size,
                "Outbox publisher started"
            );
            let mut ticker = tokio::time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown.recv() => {
                        info!("Outbox publisher stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Background loop deleting published events past their retention window.
pub struct OutboxJanitor {
    store: Arc<dyn OutboxStore>,
    retention: Duration,
    interval: Duration,
}

impl OutboxJanitor {
    /// Create a janitor keeping published events for `retention`, sweeping
    /// every `interval`.
    pub fn new(store: Arc<dyn OutboxStore>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    /// Run one sweep. Returns how many rows were deleted.
    pub async fn run_once(&self) -> u64 {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.retention).unwrap_or_else(|_| chrono::Duration::zero());

        match self.store.delete_published_before(cutoff).await {
            Ok(0) => 0,
            Ok(deleted) => {
                info!(deleted = deleted, "Pruned published outbox events");
                deleted
            }
            Err(err) => {
                error!(error = %err, "Outbox retention sweep failed");
                0
            }
        }
    }

    /// Spawn the janitor loop. Stops when `shutdown` fires.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                retention_secs = self.retention.as_secs(),
                "Outbox janitor started"
            );
            let mut ticker = tokio::time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown.recv() => {
                        info!("Outbox janitor stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OutboxEvent;
    use crate::store::InMemoryOutboxStore;
    use chrono::Utc;
    use pazar_testing::InMemoryEventBus;

    fn event(aggregate_id: Uuid, event_type: &str) -> OutboxEvent {
        OutboxEvent::new(aggregate_id, event_type, &serde_json::json!({"order_id": aggregate_id}))
            .expect("json payload")
    }

    fn publisher(store: &InMemoryOutboxStore, bus: &InMemoryEventBus) -> OutboxPublisher {
        OutboxPublisher::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            Duration::from_secs(5),
            100,
        )
    }

    #[tokio::test]
    async fn publishes_in_creation_order_and_marks_published() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        let order = Uuid::new_v4();

        store.push(event(order, "order.created"));
        store.push(event(order, "order.paid"));

        let published = publisher(&store, &bus).run_once().await;
        assert_eq!(published, 2);

        let topics: Vec<String> = bus.published().into_iter().map(|(t, _)| t).collect();
        assert_eq!(topics, vec!["order.created", "order.paid"]);
        assert!(store.rows().iter().all(|e| e.published));
        assert!(store.rows().iter().all(|e| e.published_at.is_some()));
    }

    #[tokio::test]
    async fn failure_blocks_the_aggregate_but_not_others() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        let stuck = Uuid::new_v4();
        let healthy = Uuid::new_v4();

        store.push(event(stuck, "order.created"));
        store.push(event(healthy, "order.paid"));
        store.push(event(stuck, "order.canceled"));

        bus.fail_topic("order.created");

        let published = publisher(&store, &bus).run_once().await;
        assert_eq!(published, 1);

        // The healthy aggregate went out; the stuck one kept both its events
        // unpublished so their relative order survives the retry.
        assert_eq!(bus.published_on("order.paid").len(), 1);
        assert!(bus.published_on("order.canceled").is_empty());
        let unpublished: Vec<Uuid> = store
            .rows()
            .iter()
            .filter(|e| !e.published)
            .map(|e| e.aggregate_id)
            .collect();
        assert_eq!(unpublished, vec![stuck, stuck]);
    }

    #[tokio::test]
    async fn retry_after_outage_delivers_with_the_same_event_id() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        let order = Uuid::new_v4();

        let row = event(order, "order.paid");
        let expected_id = row.id;
        store.push(row);

        bus.fail_topic("order.paid");
        assert_eq!(publisher(&store, &bus).run_once().await, 0);
        assert!(!store.rows()[0].published);

        // Broker comes back; the next tick delivers the same event with the
        // same id, so idempotent consumers converge to the same state.
        bus.heal_topic("order.paid");
        assert_eq!(publisher(&store, &bus).run_once().await, 1);
        assert_eq!(bus.published_on("order.paid")[0].event_id, expected_id);
    }

    #[tokio::test]
    async fn janitor_prunes_only_old_published_rows() {
        let store = InMemoryOutboxStore::new();

        let mut old = event(Uuid::new_v4(), "order.created");
        old.published = true;
        old.published_at = Some(Utc::now() - chrono::Duration::hours(48));
        store.push(old);

        let mut fresh = event(Uuid::new_v4(), "order.paid");
        fresh.published = true;
        fresh.published_at = Some(Utc::now());
        store.push(fresh);

        store.push(event(Uuid::new_v4(), "order.canceled")); // unpublished

        let janitor = OutboxJanitor::new(
            Arc::new(store.clone()),
            Duration::from_secs(24 * 3600),
            Duration::from_secs(60),
        );
        let deleted = janitor.run_once().await;

        assert_eq!(deleted, 1);
        assert_eq!(store.rows().len(), 2);
    }
}
