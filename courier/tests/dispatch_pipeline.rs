//! End-to-end pipeline test over in-memory infrastructure:
//!
//! cart → order → payment → outbox → bus → paid-order consumer →
//! dispatcher → assignment → `courier.assigned` on the bus.
//!
//! This is the whole order-to-courier flow with only the process
//! boundaries replaced: real services, real publisher, real consumer
//! logic, in-memory stores and bus.

use futures::StreamExt;
use pazar_core::events::{topics, CourierAssignedEvent, OrderEventPayload, VehicleType};
use pazar_core::{EventBus, Location};
use pazar_courier::cache::{InMemoryLocationCache, LocationCache};
use pazar_courier::consumer::PaidOrderConsumer;
use pazar_courier::dispatch::{DispatchConfig, Dispatcher};
use pazar_courier::stores::{
    AssignmentStore, CourierStore, InMemoryAssignmentStore, InMemoryCourierStore, LocationStore,
};
use pazar_courier::types::{
    Courier, CourierLocationSnapshot, CourierLocationUpdate, CourierStatus,
};
use pazar_order::pricing::PricingConfig;
use pazar_order::promotions::NoopPromotionClient;
use pazar_order::service::OrderService;
use pazar_order::stores::{InMemoryCartStore, InMemoryOrderStore};
use pazar_order::types::{AddToCartRequest, Address, CreateOrderRequest};
use pazar_outbox::OutboxPublisher;
use pazar_testing::InMemoryEventBus;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
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

fn address(latitude: f64, longitude: f64) -> Address {
    Address {
        street: "Bagdat Cd. 100".to_string(),
        city: "Istanbul".to_string(),
        district: "Kadikoy".to_string(),
        postal_code: None,
        country: "Turkey".to_string(),
        latitude,
        longitude,
    }
}

async fn seed_courier(
    couriers: &InMemoryCourierStore,
    cache: &InMemoryLocationCache,
    latitude: f64,
    longitude: f64,
) -> Uuid {
    let courier = Courier {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        first_name: "Emre".to_string(),
        last_name: "Kaya".to_string(),
        phone: "+905550001122".to_string(),
        email: "emre@example.com".to_string(),
        vehicle_type: VehicleType::Motorbike,
        vehicle_plate: Some("34 XYZ 99".to_string()),
        status: CourierStatus::Active,
        rating: dec!(4.8),
        completed_orders: 42,
        is_online: true,
        last_seen_at: Some(chrono::Utc::now()),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    couriers.create(&courier).await.unwrap();
    couriers
        .append(&CourierLocationUpdate {
            courier_id: courier.id,
            location: Location::new(latitude, longitude),
            speed: None,
            heading: None,
            accuracy: None,
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();
    cache
        .set_location(
            courier.id,
            &CourierLocationSnapshot {
                latitude,
                longitude,
                address: None,
                speed: None,
                heading: None,
                accuracy: None,
                timestamp: chrono::Utc::now(),
            },
            Duration::from_secs(300),
        )
        .await
        .unwrap();
    courier.id
}

#[tokio::test]
async fn paid_order_flows_through_to_a_courier_assignment() {
    let bus = InMemoryEventBus::new();

    // Order service over in-memory stores.
    let order_store = InMemoryOrderStore::new();
    let order_service = OrderService::new(
        Arc::new(InMemoryCartStore::new()),
        Arc::new(order_store.clone()),
        Arc::new(NoopPromotionClient),
        pricing(),
    );
    let order_publisher = OutboxPublisher::new(
        Arc::new(order_store.outbox_store()),
        Arc::new(bus.clone()),
        Duration::from_secs(5),
        100,
    );

    // Courier service over in-memory stores, sharing the bus.
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
        Arc::new(bus.clone()),
        dispatcher,
        Arc::new(assignments.clone()),
    );
    let courier_id = seed_courier(&couriers, &cache, 41.000, 29.000).await;

    // Subscribe where the paid-order consumer would, before anything is
    // published.
    let mut paid_stream = bus
        .subscribe(&[topics::ORDER_PAID], "courier-service-group")
        .await
        .unwrap();

    // A customer checks out and pays.
    let customer_id = Uuid::new_v4();
    order_service
        .add_to_cart(
            customer_id,
            AddToCartRequest {
                product_id: Uuid::new_v4(),
                variant_id: None,
                seller_id: Uuid::new_v4(),
                quantity: 2,
                unit_price: dec!(30.00),
                is_express: false,
                preparation_minutes: 10,
                notes: None,
            },
        )
        .await
        .unwrap();
    let order = order_service
        .create_order(
            customer_id,
            CreateOrderRequest {
                delivery_address: address(41.020, 29.010),
                pickup_address: address(41.000, 29.000),
                coupon_code: None,
                priority: 1,
                required_vehicle: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    order_service.process_payment(order.id, "pm_1").await.unwrap();

    // The outbox publisher drains both events to the bus in creation order.
    let published = order_publisher.run_once().await;
    assert_eq!(published, 2);
    let topics_seen: Vec<String> = bus.published().into_iter().map(|(t, _)| t).collect();
    assert_eq!(topics_seen, vec![topics::ORDER_CREATED, topics::ORDER_PAID]);

    // The consumer receives order.paid and dispatches.
    let envelope = paid_stream.next().await.unwrap().unwrap();
    let payload: OrderEventPayload = envelope.decode().unwrap();
    assert_eq!(payload.order_id, order.id);
    assert!(payload.pickup_location.is_some());

    consumer.handle(&envelope).await;

    let assignment = assignments
        .active_for_order(order.id)
        .await
        .unwrap()
        .expect("dispatch created an assignment");
    assert_eq!(assignment.courier_id, courier_id);

    // The courier went busy and the dispatch event sits in the courier
    // service's outbox; its publisher puts it on the bus.
    let courier = couriers.get(courier_id).await.unwrap().unwrap();
    assert_eq!(courier.status, CourierStatus::Busy);

    let courier_publisher = OutboxPublisher::new(
        Arc::new(assignments.outbox_store()),
        Arc::new(bus.clone()),
        Duration::from_secs(5),
        100,
    );
    assert_eq!(courier_publisher.run_once().await, 1);

    let assigned = bus.published_on(topics::COURIER_ASSIGNED);
    assert_eq!(assigned.len(), 1);
    let event: CourierAssignedEvent = assigned[0].decode().unwrap();
    assert_eq!(event.order_id, order.id);
    assert_eq!(event.courier_id, courier_id);
    // Courier at the pickup point on a motorbike: ceil((0 + 2) * 1.2) = 3.
    assert_eq!(event.estimated_eta_minutes, 3);
}

#[tokio::test]
async fn redelivered_paid_event_converges_to_one_assignment() {
    let bus = InMemoryEventBus::new();

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
        Arc::new(bus.clone()),
        dispatcher,
        Arc::new(assignments.clone()),
    );
    seed_courier(&couriers, &cache, 41.000, 29.000).await;
    seed_courier(&couriers, &cache, 41.001, 29.001).await;

    let order_id = Uuid::new_v4();
    let payload = OrderEventPayload {
        order_id,
        customer_id: Uuid::new_v4(),
        seller_id: Uuid::new_v4(),
        status: "PAID".to_string(),
        total_amount: dec!(69.00),
        currency: "TRY".to_string(),
        items: vec![],
        timestamp: chrono::Utc::now(),
        pickup_location: Some(Location::new(41.000, 29.000)),
        delivery_location: Some(Location::new(41.020, 29.010)),
        priority: Some(1),
        required_vehicle: None,
    };
    let envelope =
        pazar_core::EventEnvelope::new(topics::ORDER_PAID, order_id.to_string(), &payload).unwrap();

    // At-least-once delivery: the same event arrives three times.
    consumer.handle(&envelope).await;
    consumer.handle(&envelope).await;
    consumer.handle(&envelope).await;

    // One assignment, one courier.assigned event.
    assert!(assignments.active_for_order(order_id).await.unwrap().is_some());
    assert_eq!(assignments.outbox_rows().len(), 1);
}
