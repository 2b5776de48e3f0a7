//! In-memory store implementations.
//!
//! Used by tests and local development. Semantics match the PostgreSQL
//! implementations: transitions validate against the same graph, and every
//! mutating order operation appends its outbox event inside the same lock
//! scope, so the write-plus-outbox contract is observable in tests.

use crate::error::{OrderError, Result};
use crate::stores::{apply_transition, CartStore, ListPage, OrderStore};
use crate::types::{Cart, CartItem, Order, OrderStatus};
use async_trait::async_trait;
use chrono::Utc;
use pazar_outbox::{InMemoryOutboxStore, OutboxEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory cart store.
#[derive(Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<Mutex<HashMap<Uuid, Cart>>>,
}

impl InMemoryCartStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get_or_create(&self, customer_id: Uuid) -> Result<Cart> {
        let mut carts = self.carts.lock().expect("lock poisoned");
        let cart = carts.entry(customer_id).or_insert_with(|| Cart {
            id: Uuid::new_v4(),
            customer_id,
            seller_id: None,
            items: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        Ok(cart.clone())
    }

    async fn get_by_customer(&self, customer_id: Uuid) -> Result<Option<Cart>> {
        Ok(self
            .carts
            .lock()
            .expect("lock poisoned")
            .get(&customer_id)
            .cloned())
    }

    async fn add_item(&self, item: CartItem) -> Result<CartItem> {
        let mut carts = self.carts.lock().expect("lock poisoned");
        let cart = carts
            .values_mut()
            .find(|c| c.id == item.cart_id)
            .ok_or(OrderError::NotFound("Cart"))?;

        cart.seller_id.get_or_insert(item.seller_id);
        cart.items.push(item.clone());
        cart.updated_at = Utc::now();
        Ok(item)
    }

    async fn update_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<()> {
        let mut carts = self.carts.lock().expect("lock poisoned");
        let cart = carts
            .values_mut()
            .find(|c| c.id == cart_id)
            .ok_or(OrderError::NotFound("Cart"))?;
        let item = cart
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(OrderError::NotFound("Cart item"))?;

        item.quantity = quantity;
        if notes.is_some() {
            item.notes = notes;
        }
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<()> {
        let mut carts = self.carts.lock().expect("lock poisoned");
        let cart = carts
            .values_mut()
            .find(|c| c.id == cart_id)
            .ok_or(OrderError::NotFound("Cart"))?;

        let before = cart.items.len();
        cart.items.retain(|i| i.id != item_id);
        if cart.items.len() == before {
            return Err(OrderError::NotFound("Cart item"));
        }
        Ok(())
    }

    async fn clear(&self, cart_id: Uuid) -> Result<()> {
        let mut carts = self.carts.lock().expect("lock poisoned");
        let cart = carts
            .values_mut()
            .find(|c| c.id == cart_id)
            .ok_or(OrderError::NotFound("Cart"))?;

        cart.items.clear();
        cart.seller_id = None;
        cart.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory order store.
///
/// Shares its outbox log with the [`InMemoryOutboxStore`] returned by
/// [`InMemoryOrderStore::outbox_store`], so a test can create orders through
/// one and drain events through the other.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<Mutex<HashMap<Uuid, Order>>>,
    outbox: InMemoryOutboxStore,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An outbox store view over this store's event log; hand this to the
    /// publisher in tests.
    #[must_use]
    pub fn outbox_store(&self) -> InMemoryOutboxStore {
        self.outbox.clone()
    }

    /// All outbox rows, published or not, in insertion order.
    #[must_use]
    pub fn outbox_rows(&self) -> Vec<OutboxEvent> {
        self.outbox.rows()
    }

    fn list_matching(
        &self,
        page: ListPage,
        predicate: impl Fn(&Order) -> bool,
    ) -> (Vec<Order>, i64) {
        let orders = self.orders.lock().expect("lock poisoned");
        let mut matching: Vec<Order> = orders.values().filter(|o| predicate(o)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        let page_items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        (page_items, total)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.lock().expect("lock poisoned");
        let event = order.outbox_event()?;
        orders.insert(order.id, order.clone());
        self.outbox.push(event);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.lock().expect("lock poisoned").get(&id).cloned())
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        page: ListPage,
    ) -> Result<(Vec<Order>, i64)> {
        Ok(self.list_matching(page, |o| o.customer_id == customer_id))
    }

    async fn list_by_seller(&self, seller_id: Uuid, page: ListPage) -> Result<(Vec<Order>, i64)> {
        Ok(self.list_matching(page, |o| o.seller_id == seller_id))
    }

    async fn list_by_courier(
        &self,
        courier_id: Uuid,
        page: ListPage,
    ) -> Result<(Vec<Order>, i64)> {
        Ok(self.list_matching(page, |o| o.courier_id == Some(courier_id)))
    }

    async fn transition(&self, id: Uuid, to: OrderStatus, notes: Option<String>) -> Result<Order> {
        let mut orders = self.orders.lock().expect("lock poisoned");
        let order = orders.get_mut(&id).ok_or(OrderError::NotFound("Order"))?;

        apply_transition(order, to, notes)?;
        let event = order.outbox_event()?;
        self.outbox.push(event);
        Ok(order.clone())
    }

    async fn assign_courier(&self, id: Uuid, courier_id: Uuid) -> Result<Order> {
        let mut orders = self.orders.lock().expect("lock poisoned");
        let order = orders.get_mut(&id).ok_or(OrderError::NotFound("Order"))?;

        let previous = order.courier_id;
        order.courier_id = Some(courier_id);
        if let Err(err) = apply_transition(order, OrderStatus::Assigned, None) {
            order.courier_id = previous;
            return Err(err);
        }
        let event = order.outbox_event()?;
        self.outbox.push(event);
        Ok(order.clone())
    }

    async fn pay(&self, id: Uuid, payment_id: Uuid) -> Result<Order> {
        let mut orders = self.orders.lock().expect("lock poisoned");
        let order = orders.get_mut(&id).ok_or(OrderError::NotFound("Order"))?;

        let previous = order.payment_id;
        order.payment_id = Some(payment_id);
        if let Err(err) = apply_transition(order, OrderStatus::Paid, None) {
            order.payment_id = previous;
            return Err(err);
        }
        let event = order.outbox_event()?;
        self.outbox.push(event);
        Ok(order.clone())
    }
}
