//! Storage abstractions for the order service.
//!
//! Each store is a trait with a PostgreSQL implementation for production and
//! an in-memory implementation for tests. The trait methods are
//! self-contained operations: implementations guarantee that an operation's
//! writes land atomically (one transaction in Postgres, one lock scope in
//! memory), which is what makes the write-plus-outbox contract hold.

pub mod memory;
pub mod postgres;

use crate::error::{OrderError, Result};
use crate::types::{Cart, CartItem, Order, OrderStatus};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

pub use memory::{InMemoryCartStore, InMemoryOrderStore};
pub use postgres::{PostgresCartStore, PostgresOrderStore};

/// A page request for list queries. Pages are 1-indexed.
#[derive(Debug, Clone, Copy)]
pub struct ListPage {
    /// 1-indexed page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl ListPage {
    /// Row offset for this page.
    #[must_use]
    pub const fn offset(self) -> i64 {
        (self.page.saturating_sub(1) as i64) * (self.limit as i64)
    }
}

impl Default for ListPage {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

/// Mutate an order for a status transition, enforcing the transition graph.
///
/// Shared by every [`OrderStore`] implementation so the state machine cannot
/// drift between backends. Must be called while the implementation holds its
/// exclusive lock on the order (row lock or mutex).
pub(crate) fn apply_transition(
    order: &mut Order,
    to: OrderStatus,
    notes: Option<String>,
) -> Result<()> {
    let from = order.status;
    if !from.can_transition_to(to) {
        return Err(OrderError::InvalidTransition { from, to });
    }

    order.status = to;
    if let Some(notes) = notes {
        order.notes = Some(notes);
    }
    if to == OrderStatus::Delivered && order.actual_delivery_time.is_none() {
        order.actual_delivery_time = Some(Utc::now());
    }
    order.updated_at = Utc::now();
    Ok(())
}

/// Persistent storage for carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Fetch the customer's cart, creating an empty one if none exists.
    async fn get_or_create(&self, customer_id: Uuid) -> Result<Cart>;

    /// Fetch the customer's cart, if they have one.
    async fn get_by_customer(&self, customer_id: Uuid) -> Result<Option<Cart>>;

    /// Add an item to its cart and pin the cart's seller if unset.
    async fn add_item(&self, item: CartItem) -> Result<CartItem>;

    /// Update an item's quantity and note.
    async fn update_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<()>;

    /// Remove an item.
    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<()>;

    /// Remove all items and unpin the seller.
    async fn clear(&self, cart_id: Uuid) -> Result<()>;
}

/// Persistent storage for orders.
///
/// Every mutating operation writes its outbox event in the same transaction
/// as the order change; either both land or neither does.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order with its items and its `order.created` event.
    async fn create(&self, order: &Order) -> Result<()>;

    /// Fetch an order with its items.
    async fn get(&self, id: Uuid) -> Result<Option<Order>>;

    /// Orders for a customer, newest first, with the total count.
    async fn list_by_customer(&self, customer_id: Uuid, page: ListPage)
        -> Result<(Vec<Order>, i64)>;

    /// Orders for a seller, newest first, with the total count.
    async fn list_by_seller(&self, seller_id: Uuid, page: ListPage) -> Result<(Vec<Order>, i64)>;

    /// Orders for a courier, newest first, with the total count.
    async fn list_by_courier(&self, courier_id: Uuid, page: ListPage)
        -> Result<(Vec<Order>, i64)>;

    /// Move an order to a new status under a row lock, rejecting edges not
    /// in the transition graph, and record the matching event.
    async fn transition(&self, id: Uuid, to: OrderStatus, notes: Option<String>) -> Result<Order>;

    /// Set the courier and move the order to `ASSIGNED` in one step.
    async fn assign_courier(&self, id: Uuid, courier_id: Uuid) -> Result<Order>;

    /// Record the payment and move the order to `PAID` in one step. Rejected
    /// unless the order is in `CREATED`.
    async fn pay(&self, id: Uuid, payment_id: Uuid) -> Result<Order>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use rust_decimal::Decimal;

    fn order(status: OrderStatus) -> Order {
        let address = Address {
            street: "Moda Cd. 10".to_string(),
            city: "Istanbul".to_string(),
            district: "Kadikoy".to_string(),
            postal_code: None,
            country: "Turkey".to_string(),
            latitude: 40.987,
            longitude: 29.03,
        };
        Order {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            status,
            items: vec![],
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            delivery_fee: Decimal::ZERO,
            small_cart_fee: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            currency: "TRY".to_string(),
            delivery_address: address.clone(),
            pickup_address: address,
            estimated_delivery_time: None,
            actual_delivery_time: None,
            courier_id: None,
            payment_id: None,
            coupon_code: None,
            priority: 1,
            required_vehicle: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn transition_rejects_illegal_edges_without_mutating() {
        let mut o = order(OrderStatus::Created);
        let err = apply_transition(&mut o, OrderStatus::Delivered, None).unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Created,
                to: OrderStatus::Delivered
            }
        );
        assert_eq!(o.status, OrderStatus::Created);
        assert!(o.actual_delivery_time.is_none());
    }

    #[test]
    fn delivered_transition_stamps_actual_delivery_time() {
        let mut o = order(OrderStatus::OnTheWay);
        apply_transition(&mut o, OrderStatus::Delivered, None).unwrap();
        assert_eq!(o.status, OrderStatus::Delivered);
        assert!(o.actual_delivery_time.is_some());
    }

    #[test]
    fn notes_are_recorded_with_the_change() {
        let mut o = order(OrderStatus::Created);
        apply_transition(&mut o, OrderStatus::Canceled, Some("customer request".into())).unwrap();
        assert_eq!(o.notes.as_deref(), Some("customer request"));
    }

    #[test]
    fn page_offsets_are_one_indexed() {
        assert_eq!(ListPage { page: 1, limit: 20 }.offset(), 0);
        assert_eq!(ListPage { page: 3, limit: 20 }.offset(), 40);
        assert_eq!(ListPage { page: 0, limit: 20 }.offset(), 0);
    }
}
