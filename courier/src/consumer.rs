//! The `order.paid` consumer.
//!
//! Subscribes to the order service's paid events (consumer group
//! `courier-service-group`, starting at the latest offset) and hands each
//! one to the dispatcher. Delivery is at-least-once, so the consumer is
//! idempotent: an order that already has a live assignment is acknowledged
//! without re-dispatching.
//!
//! The loop follows the subscribe-process-reconnect pattern: a dropped
//! stream triggers a delayed resubscribe, individual bad messages are
//! logged and skipped, and a shutdown signal exits cleanly.

use crate::dispatch::Dispatcher;
use crate::stores::AssignmentStore;
use crate::types::AssignOrderRequest;
use futures::StreamExt;
use pazar_core::events::{topics, OrderEventPayload};
use pazar_core::{EventBus, EventEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consumer group this service joins for `order.paid`.
pub const CONSUMER_GROUP: &str = "courier-service-group";

/// Background consumer turning paid orders into dispatch requests.
pub struct PaidOrderConsumer {
    bus: Arc<dyn EventBus>,
    dispatcher: Arc<Dispatcher>,
    assignments: Arc<dyn AssignmentStore>,
    reconnect_delay: Duration,
}

impl PaidOrderConsumer {
    /// Wire the consumer.
    pub fn new(
        bus: Arc<dyn EventBus>,
        dispatcher: Arc<Dispatcher>,
        assignments: Arc<dyn AssignmentStore>,
    ) -> Self {
        Self {
            bus,
            dispatcher,
            assignments,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Handle one envelope. Failures are logged, never propagated: the loop
    /// moves on to the next message.
    pub async fn handle(&self, envelope: &EventEnvelope) {
        let payload: OrderEventPayload = match envelope.decode() {
            Ok(payload) => payload,
            Err(err) => {
                error!(event_id = %envelope.event_id, error = %err, "Malformed order.paid payload");
                return;
            }
        };

        debug!(order_id = %payload.order_id, event_id = %envelope.event_id, "Received order.paid");

        // At-least-once delivery: a redelivered event for an order that
        // already has a live assignment is simply acknowledged.
        match self.assignments.active_for_order(payload.order_id).await {
            Ok(Some(existing)) => {
                debug!(
                    order_id = %payload.order_id,
                    assignment_id = %existing.id,
                    "Order already assigned, skipping duplicate event"
                );
                return;
            }
            Ok(None) => {}
            Err(err) => {
                error!(order_id = %payload.order_id, error = %err, "Failed idempotency check");
                return;
            }
        }

        let (Some(pickup), Some(delivery)) =
            (payload.pickup_location.clone(), payload.delivery_location.clone())
        else {
            error!(order_id = %payload.order_id, "order.paid event is missing dispatch locations");
            return;
        };

        let request = AssignOrderRequest {
            order_id: payload.order_id,
            pickup_location: pickup,
            delivery_location: delivery,
            priority: payload.priority.unwrap_or(1),
            required_vehicle: payload.required_vehicle,
            max_distance_km: None,
            notes: None,
        };

        match self.dispatcher.assign_order(request).await {
            Ok(response) if response.success => {
                info!(
                    order_id = %payload.order_id,
                    method = ?response.method,
                    processing_ms = response.processing_ms,
                    "Courier assigned from order.paid event"
                );
            }
            Ok(response) => {
                warn!(
                    order_id = %payload.order_id,
                    method = ?response.method,
                    message = %response.message,
                    "No courier assigned"
                );
            }
            Err(err) => {
                error!(order_id = %payload.order_id, error = %err, "Dispatch failed");
            }
        }
    }

    /// Spawn the consumer loop. Reconnects on stream loss; stops when
    /// `shutdown` fires.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(topic = topics::ORDER_PAID, group = CONSUMER_GROUP, "Paid-order consumer started");

            loop {
                let mut stream = match self
                    .bus
                    .subscribe(&[topics::ORDER_PAID], CONSUMER_GROUP)
                    .await
                {
                    Ok(stream) => stream,
                    Err(err) => {
                        warn!(error = %err, "Subscription failed, retrying");
                        tokio::select! {
                            _ = tokio::time::sleep(self.reconnect_delay) => continue,
                            _ = shutdown.recv() => break,
                        }
                    }
                };

                loop {
                    tokio::select! {
                        received = stream.next() => match received {
                            Some(Ok(envelope)) => self.handle(&envelope).await,
                            Some(Err(err)) => {
                                warn!(error = %err, "Event stream error");
                            }
                            None => {
                                warn!("Event stream ended, resubscribing");
                                break;
                            }
                        },
                        _ = shutdown.recv() => {
                            info!("Paid-order consumer stopping");
                            return;
                        }
                    }
                }

                tokio::time::sleep(self.reconnect_delay).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryLocationCache, LocationCache};
    use crate::dispatch::{DispatchConfig, Dispatcher};
    use crate::stores::{CourierStore, InMemoryAssignmentStore, InMemoryCourierStore, LocationStore};
    use crate::types::{Courier, CourierLocationSnapshot, CourierLocationUpdate, CourierStatus};
    use chrono::Utc;
    use pazar_core::events::{OrderEventItem, VehicleType};
    use pazar_core::Location;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct Fixture {
        consumer: PaidOrderConsumer,
        assignments: InMemoryAssignmentStore,
        couriers: InMemoryCourierStore,
        cache: InMemoryLocationCache,
    }

    fn fixture() -> Fixture {
        let couriers = InMemoryCourierStore::new();
        let assignments = InMemoryAssignmentStore::new(couriers.clone());
        let cache = InMemoryLocationCache::new();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(couriers.clone()),
            Arc::new(assignments.clone()),
            Arc::new(cache.clone()),
            DispatchConfig::default(),
        ));
        let consumer = PaidOrderConsumer::new(
            Arc::new(pazar_testing::InMemoryEventBus::new()),
            dispatcher,
            Arc::new(assignments.clone()),
        );
        Fixture {
            consumer,
            assignments,
            couriers,
            cache,
        }
    }

    async fn seed_courier(fixture: &Fixture) -> Uuid {
        let courier = Courier {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            first_name: "Test".to_string(),
            last_name: "Courier".to_string(),
            phone: "+905550000000".to_string(),
            email: "courier@example.com".to_string(),
            vehicle_type: VehicleType::Motorbike,
            vehicle_plate: None,
            status: CourierStatus::Active,
            rating: dec!(5.0),
            completed_orders: 0,
            is_online: true,
            last_seen_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        fixture.couriers.create(&courier).await.unwrap();
        fixture
            .couriers
            .append(&CourierLocationUpdate {
                courier_id: courier.id,
                location: Location::new(41.0, 29.0),
                speed: None,
                heading: None,
                accuracy: None,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        fixture
            .cache
            .set_location(
                courier.id,
                &CourierLocationSnapshot {
                    latitude: 41.0,
                    longitude: 29.0,
                    address: None,
                    speed: None,
                    heading: None,
                    accuracy: None,
                    timestamp: Utc::now(),
                },
                Duration::from_secs(300),
            )
            .await
            .unwrap();
        courier.id
    }

    fn paid_envelope(order_id: Uuid) -> EventEnvelope {
        let payload = OrderEventPayload {
            order_id,
            customer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            status: "PAID".to_string(),
            total_amount: dec!(69.00),
            currency: "TRY".to_string(),
            items: vec![OrderEventItem {
                product_id: Uuid::new_v4(),
                variant_id: None,
                quantity: 1,
                unit_price: dec!(50.00),
                total_price: dec!(50.00),
            }],
            timestamp: Utc::now(),
            pickup_location: Some(Location::new(41.0, 29.0)),
            delivery_location: Some(Location::new(41.05, 29.05)),
            priority: Some(1),
            required_vehicle: None,
        };
        EventEnvelope::new(topics::ORDER_PAID, order_id.to_string(), &payload).unwrap()
    }

    #[tokio::test]
    async fn paid_event_produces_an_assignment() {
        let fixture = fixture();
        let courier_id = seed_courier(&fixture).await;
        let order_id = Uuid::new_v4();

        fixture.consumer.handle(&paid_envelope(order_id)).await;

        let assignment = fixture
            .assignments
            .active_for_order(order_id)
            .await
            .unwrap()
            .expect("assignment created");
        assert_eq!(assignment.courier_id, courier_id);
    }

    #[tokio::test]
    async fn redelivered_event_does_not_dispatch_twice() {
        let fixture = fixture();
        seed_courier(&fixture).await;
        let order_id = Uuid::new_v4();

        let envelope = paid_envelope(order_id);
        fixture.consumer.handle(&envelope).await;
        fixture.consumer.handle(&envelope).await;

        // One live assignment, one courier.assigned event.
        assert_eq!(fixture.assignments.outbox_rows().len(), 1);
    }

    #[tokio::test]
    async fn event_without_locations_is_dropped() {
        let fixture = fixture();
        seed_courier(&fixture).await;
        let order_id = Uuid::new_v4();

        let mut envelope = paid_envelope(order_id);
        let mut payload: OrderEventPayload = envelope.decode().unwrap();
        payload.pickup_location = None;
        envelope.payload = serde_json::to_vec(&payload).unwrap();

        fixture.consumer.handle(&envelope).await;
        assert!(fixture
            .assignments
            .active_for_order(order_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let fixture = fixture();
        seed_courier(&fixture).await;

        let envelope = EventEnvelope::new(
            topics::ORDER_PAID,
            "bogus",
            &serde_json::json!({"not": "an order"}),
        )
        .unwrap();
        fixture.consumer.handle(&envelope).await;
        assert!(fixture.assignments.outbox_rows().is_empty());
    }
}
