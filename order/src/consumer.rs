//! The `courier.assigned` consumer.
//!
//! Closes the dispatch loop: when the courier service announces an
//! assignment, the order records its courier and moves to `ASSIGNED`,
//! emitting `order.assigned` through the outbox like any other transition.
//!
//! Delivery is at-least-once. Redelivery after the order has already moved
//! to `ASSIGNED` surfaces as an invalid `ASSIGNED → ASSIGNED` transition,
//! which the consumer treats as a duplicate and acknowledges.

use crate::error::OrderError;
use crate::service::OrderService;
use crate::types::OrderStatus;
use futures::StreamExt;
use pazar_core::events::{topics, CourierAssignedEvent};
use pazar_core::{EventBus, EventEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consumer group this service joins for `courier.assigned`.
pub const CONSUMER_GROUP: &str = "order-service-group";

/// Background consumer applying dispatch decisions to orders.
pub struct AssignedCourierConsumer {
    bus: Arc<dyn EventBus>,
    service: Arc<OrderService>,
    reconnect_delay: Duration,
}

impl AssignedCourierConsumer {
    /// Wire the consumer.
    pub fn new(bus: Arc<dyn EventBus>, service: Arc<OrderService>) -> Self {
        Self {
            bus,
            service,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Handle one envelope. Failures are logged, never propagated.
    pub async fn handle(&self, envelope: &EventEnvelope) {
        let event: CourierAssignedEvent = match envelope.decode() {
            Ok(event) => event,
            Err(err) => {
                error!(event_id = %envelope.event_id, error = %err, "Malformed courier.assigned payload");
                return;
            }
        };

        match self
            .service
            .assign_courier(event.order_id, event.courier_id)
            .await
        {
            Ok(_) => {
                info!(
                    order_id = %event.order_id,
                    courier_id = %event.courier_id,
                    "Order marked assigned"
                );
            }
            // Redelivered event for an order that already took the edge.
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Assigned,
                ..
            }) => {
                debug!(order_id = %event.order_id, "Order already assigned, skipping duplicate event");
            }
            Err(err) => {
                error!(order_id = %event.order_id, error = %err, "Failed to apply assignment");
            }
        }
    }

    /// Spawn the consumer loop. Reconnects on stream loss; stops when
    /// `shutdown` fires.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                topic = topics::COURIER_ASSIGNED,
                group = CONSUMER_GROUP,
                "Assigned-courier consumer started"
            );

            loop {
                let mut stream = match self
                    .bus
                    .subscribe(&[topics::COURIER_ASSIGNED], CONSUMER_GROUP)
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
                            info!("Assigned-courier consumer stopping");
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
    use crate::pricing::PricingConfig;
    use crate::promotions::NoopPromotionClient;
    use crate::stores::{InMemoryCartStore, InMemoryOrderStore};
    use crate::types::{AddToCartRequest, Address, CreateOrderRequest};
    use chrono::Utc;
    use pazar_core::events::AssignmentMethod;
    use pazar_testing::InMemoryEventBus;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn pricing() -> PricingConfig {
        PricingConfig {
            tax_rate_percent: dec!(18.00),
            delivery_fee: dec!(10.00),
            express_delivery_fee: dec!(20.00),
            small_cart_fee: dec!(5.00),
            min_order_amount: dec!(50.00),
            currency: "TRY".to_string(),
        }
    }

    fn address() -> Address {
        Address {
            street: "Istiklal Cd. 1".to_string(),
            city: "Istanbul".to_string(),
            district: "Beyoglu".to_string(),
            postal_code: None,
            country: "Turkey".to_string(),
            latitude: 41.03,
            longitude: 28.98,
        }
    }

    async fn paid_order(service: &OrderService) -> Uuid {
        let customer = Uuid::new_v4();
        service
            .add_to_cart(
                customer,
                AddToCartRequest {
                    product_id: Uuid::new_v4(),
                    variant_id: None,
                    seller_id: Uuid::new_v4(),
                    quantity: 1,
                    unit_price: dec!(60.00),
                    is_express: false,
                    preparation_minutes: 10,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let order = service
            .create_order(
                customer,
                CreateOrderRequest {
                    delivery_address: address(),
                    pickup_address: address(),
                    coupon_code: None,
                    priority: 1,
                    required_vehicle: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        service.process_payment(order.id, "pm_1").await.unwrap();
        order.id
    }

    fn assigned_envelope(order_id: Uuid, courier_id: Uuid) -> EventEnvelope {
        let event = CourierAssignedEvent {
            assignment_id: Uuid::new_v4(),
            order_id,
            courier_id,
            estimated_eta_minutes: 7,
            assignment_method: AssignmentMethod::Proximity,
            distance_km: 1.2,
            timestamp: Utc::now(),
        };
        EventEnvelope::new(topics::COURIER_ASSIGNED, order_id.to_string(), &event).unwrap()
    }

    #[tokio::test]
    async fn assignment_event_moves_the_order_to_assigned() {
        let orders = InMemoryOrderStore::new();
        let service = Arc::new(OrderService::new(
            Arc::new(InMemoryCartStore::new()),
            Arc::new(orders.clone()),
            Arc::new(NoopPromotionClient),
            pricing(),
        ));
        let consumer =
            AssignedCourierConsumer::new(Arc::new(InMemoryEventBus::new()), service.clone());

        let order_id = paid_order(&service).await;
        let courier_id = Uuid::new_v4();

        consumer.handle(&assigned_envelope(order_id, courier_id)).await;

        let order = service.get_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Assigned);
        assert_eq!(order.courier_id, Some(courier_id));

        let types: Vec<String> = orders
            .outbox_rows()
            .iter()
            .map(|e| e.event_type.clone())
            .collect();
        assert_eq!(types, vec!["order.created", "order.paid", "order.assigned"]);
    }

    #[tokio::test]
    async fn redelivered_assignment_event_is_acknowledged_once() {
        let orders = InMemoryOrderStore::new();
        let service = Arc::new(OrderService::new(
            Arc::new(InMemoryCartStore::new()),
            Arc::new(orders.clone()),
            Arc::new(NoopPromotionClient),
            pricing(),
        ));
        let consumer =
            AssignedCourierConsumer::new(Arc::new(InMemoryEventBus::new()), service.clone());

        let order_id = paid_order(&service).await;
        let envelope = assigned_envelope(order_id, Uuid::new_v4());

        consumer.handle(&envelope).await;
        consumer.handle(&envelope).await;

        // Exactly one order.assigned row despite the duplicate delivery.
        let assigned = orders
            .outbox_rows()
            .iter()
            .filter(|e| e.event_type == "order.assigned")
            .count();
        assert_eq!(assigned, 1);
    }
}
