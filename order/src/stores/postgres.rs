//! PostgreSQL implementations of the order-service stores.
//!
//! Queries are runtime-checked `sqlx` queries over a shared [`PgPool`].
//! Status transitions take a `SELECT .. FOR UPDATE` row lock so concurrent
//! transitions on one order serialize, and every mutating operation writes
//! its outbox event inside the same transaction as the order change.

use crate::error::{OrderError, Result};
use crate::stores::{apply_transition, CartStore, ListPage, OrderStore};
use crate::types::{Cart, CartItem, Order, OrderItem, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pazar_core::events::VehicleType;
use pazar_outbox::OutboxEvent;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Apply the service schema. Idempotent.
///
/// # Errors
///
/// Returns [`OrderError::Database`] if the migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| OrderError::database("Migration failed", e))
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    customer_id: Uuid,
    seller_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    cart_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    seller_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
    is_express: bool,
    preparation_minutes: i32,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            seller_id: row.seller_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            is_express: row.is_express,
            preparation_minutes: row.preparation_minutes,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    seller_id: Uuid,
    status: String,
    subtotal: Decimal,
    tax_amount: Decimal,
    delivery_fee: Decimal,
    small_cart_fee: Decimal,
    discount_amount: Decimal,
    total_amount: Decimal,
    currency: String,
    delivery_address: serde_json::Value,
    pickup_address: serde_json::Value,
    estimated_delivery_time: Option<DateTime<Utc>>,
    actual_delivery_time: Option<DateTime<Utc>>,
    courier_id: Option<Uuid>,
    payment_id: Option<Uuid>,
    coupon_code: Option<String>,
    priority: i32,
    required_vehicle: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// Decode into the domain type. Items are loaded separately.
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e: String| OrderError::database("Corrupt order row", e))?;
        let required_vehicle = self
            .required_vehicle
            .map(|v| v.parse::<VehicleType>())
            .transpose()
            .map_err(|e| OrderError::database("Corrupt order row", e))?;
        let delivery_address = serde_json::from_value(self.delivery_address)
            .map_err(|e| OrderError::database("Corrupt delivery address", e))?;
        let pickup_address = serde_json::from_value(self.pickup_address)
            .map_err(|e| OrderError::database("Corrupt pickup address", e))?;

        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            seller_id: self.seller_id,
            status,
            items,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            delivery_fee: self.delivery_fee,
            small_cart_fee: self.small_cart_fee,
            discount_amount: self.discount_amount,
            total_amount: self.total_amount,
            currency: self.currency,
            delivery_address,
            pickup_address,
            estimated_delivery_time: self.estimated_delivery_time,
            actual_delivery_time: self.actual_delivery_time,
            courier_id: self.courier_id,
            payment_id: self.payment_id,
            coupon_code: self.coupon_code,
            priority: self.priority,
            required_vehicle,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

// ============================================================================
// Cart store
// ============================================================================

/// PostgreSQL cart store.
#[derive(Clone)]
pub struct PostgresCartStore {
    pool: PgPool,
}

impl PostgresCartStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, cart_id: Uuid) -> Result<Vec<CartItem>> {
        let rows: Vec<CartItemRow> = sqlx::query_as(
            "SELECT id, cart_id, product_id, variant_id, seller_id, quantity, unit_price,
                    is_express, preparation_minutes, notes, created_at, updated_at
             FROM cart_items WHERE cart_id = $1 ORDER BY created_at",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OrderError::database("Failed to load cart items", e))?;

        Ok(rows.into_iter().map(CartItem::from).collect())
    }

    fn cart_from(&self, row: CartRow, items: Vec<CartItem>) -> Cart {
        Cart {
            id: row.id,
            customer_id: row.customer_id,
            seller_id: row.seller_id,
            items,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CartStore for PostgresCartStore {
    async fn get_or_create(&self, customer_id: Uuid) -> Result<Cart> {
        let row: CartRow = sqlx::query_as(
            "INSERT INTO carts (id, customer_id) VALUES ($1, $2)
             ON CONFLICT (customer_id) DO UPDATE SET updated_at = carts.updated_at
             RETURNING id, customer_id, seller_id, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OrderError::database("Failed to get or create cart", e))?;

        let items = self.load_items(row.id).await?;
        Ok(self.cart_from(row, items))
    }

    async fn get_by_customer(&self, customer_id: Uuid) -> Result<Option<Cart>> {
        let row: Option<CartRow> = sqlx::query_as(
            "SELECT id, customer_id, seller_id, created_at, updated_at
             FROM carts WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OrderError::database("Failed to load cart", e))?;

        match row {
            Some(row) => {
                let items = self.load_items(row.id).await?;
                Ok(Some(self.cart_from(row, items)))
            }
            None => Ok(None),
        }
    }

    async fn add_item(&self, item: CartItem) -> Result<CartItem> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderError::database("Failed to begin transaction", e))?;

        sqlx::query(
            "INSERT INTO cart_items
                (id, cart_id, product_id, variant_id, seller_id, quantity, unit_price,
                 is_express, preparation_minutes, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(item.id)
        .bind(item.cart_id)
        .bind(item.product_id)
        .bind(item.variant_id)
        .bind(item.seller_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.is_express)
        .bind(item.preparation_minutes)
        .bind(&item.notes)
        .execute(&mut *tx)
        .await
        .map_err(|e| OrderError::database("Failed to add cart item", e))?;

        // First item pins the cart to its seller.
        sqlx::query(
            "UPDATE carts SET seller_id = COALESCE(seller_id, $2), updated_at = now()
             WHERE id = $1",
        )
        .bind(item.cart_id)
        .bind(item.seller_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| OrderError::database("Failed to pin cart seller", e))?;

        tx.commit()
            .await
            .map_err(|e| OrderError::database("Failed to commit cart item", e))?;

        Ok(item)
    }

    async fn update_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE cart_items SET quantity = $3, notes = COALESCE($4, notes), updated_at = now()
             WHERE id = $2 AND cart_id = $1",
        )
        .bind(cart_id)
        .bind(item_id)
        .bind(quantity)
        .bind(notes)
        .execute(&self.pool)
        .await
        .map_err(|e| OrderError::database("Failed to update cart item", e))?;

        if result.rows_affected() == 0 {
            return Err(OrderError::NotFound("Cart item"));
        }
        Ok(())
    }

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $2 AND cart_id = $1")
            .bind(cart_id)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(|e| OrderError::database("Failed to remove cart item", e))?;

        if result.rows_affected() == 0 {
            return Err(OrderError::NotFound("Cart item"));
        }
        Ok(())
    }

    async fn clear(&self, cart_id: Uuid) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderError::database("Failed to begin transaction", e))?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| OrderError::database("Failed to clear cart items", e))?;

        sqlx::query("UPDATE carts SET seller_id = NULL, updated_at = now() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| OrderError::database("Failed to unpin cart seller", e))?;

        tx.commit()
            .await
            .map_err(|e| OrderError::database("Failed to commit cart clear", e))
    }
}

// ============================================================================
// Order store
// ============================================================================

const ORDER_COLUMNS: &str = "id, customer_id, seller_id, status, subtotal, tax_amount, \
     delivery_fee, small_cart_fee, discount_amount, total_amount, currency, \
     delivery_address, pickup_address, estimated_delivery_time, actual_delivery_time, \
     courier_id, payment_id, coupon_code, priority, required_vehicle, notes, \
     created_at, updated_at";

/// PostgreSQL order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_order(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Order> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| OrderError::database("Failed to lock order", e))?;

        let row = row.ok_or(OrderError::NotFound("Order"))?;
        let items = Self::load_items_tx(tx, id).await?;
        row.into_order(items)
    }

    async fn load_items_tx(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> Result<Vec<OrderItem>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, variant_id, quantity, unit_price, total_price,
                    notes, created_at
             FROM order_items WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| OrderError::database("Failed to load order items", e))?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn load_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, variant_id, quantity, unit_price, total_price,
                    notes, created_at
             FROM order_items WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OrderError::database("Failed to load order items", e))?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    /// Persist the mutable order fields and the outbox event, then commit.
    async fn store_transition(
        &self,
        mut tx: Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE orders
             SET status = $2, notes = $3, actual_delivery_time = $4, courier_id = $5,
                 payment_id = $6, updated_at = $7
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(&order.notes)
        .bind(order.actual_delivery_time)
        .bind(order.courier_id)
        .bind(order.payment_id)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| OrderError::database("Failed to update order", e))?;

        let event = order.outbox_event()?;
        insert_outbox(&mut tx, &event).await?;

        tx.commit()
            .await
            .map_err(|e| OrderError::database("Failed to commit order transition", e))
    }

    async fn list_where(
        &self,
        column: &str,
        value: Uuid,
        page: ListPage,
    ) -> Result<(Vec<Order>, i64)> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = $1
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(value)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OrderError::database("Failed to list orders", e))?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {column} = $1"))
                .bind(value)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| OrderError::database("Failed to count orders", e))?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.load_items(row.id).await?;
            orders.push(row.into_order(items)?);
        }
        Ok((orders, total))
    }
}

/// Insert an outbox row inside the caller's transaction.
async fn insert_outbox(tx: &mut Transaction<'_, Postgres>, event: &OutboxEvent) -> Result<()> {
    sqlx::query(
        "INSERT INTO outbox_events (id, aggregate_id, event_type, event_data, published, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(event.id)
    .bind(event.aggregate_id)
    .bind(&event.event_type)
    .bind(&event.event_data)
    .bind(event.published)
    .bind(event.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| OrderError::database("Failed to insert outbox event", e))?;
    Ok(())
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, order: &Order) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderError::database("Failed to begin transaction", e))?;

        sqlx::query(
            "INSERT INTO orders
                (id, customer_id, seller_id, status, subtotal, tax_amount, delivery_fee,
                 small_cart_fee, discount_amount, total_amount, currency, delivery_address,
                 pickup_address, estimated_delivery_time, courier_id, payment_id, coupon_code,
                 priority, required_vehicle, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     $17, $18, $19, $20, $21, $22)",
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.seller_id)
        .bind(order.status.as_str())
        .bind(order.subtotal)
        .bind(order.tax_amount)
        .bind(order.delivery_fee)
        .bind(order.small_cart_fee)
        .bind(order.discount_amount)
        .bind(order.total_amount)
        .bind(&order.currency)
        .bind(serde_json::to_value(&order.delivery_address)?)
        .bind(serde_json::to_value(&order.pickup_address)?)
        .bind(order.estimated_delivery_time)
        .bind(order.courier_id)
        .bind(order.payment_id)
        .bind(&order.coupon_code)
        .bind(order.priority)
        .bind(order.required_vehicle.map(|v| v.as_str()))
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| OrderError::database("Failed to insert order", e))?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items
                    (id, order_id, product_id, variant_id, quantity, unit_price, total_price, notes)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price)
            .bind(&item.notes)
            .execute(&mut *tx)
            .await
            .map_err(|e| OrderError::database("Failed to insert order item", e))?;
        }

        let event = order.outbox_event()?;
        insert_outbox(&mut tx, &event).await?;

        tx.commit()
            .await
            .map_err(|e| OrderError::database("Failed to commit order", e))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| OrderError::database("Failed to load order", e))?;

        match row {
            Some(row) => {
                let items = self.load_items(row.id).await?;
                Ok(Some(row.into_order(items)?))
            }
            None => Ok(None),
        }
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        page: ListPage,
    ) -> Result<(Vec<Order>, i64)> {
        self.list_where("customer_id", customer_id, page).await
    }

    async fn list_by_seller(&self, seller_id: Uuid, page: ListPage) -> Result<(Vec<Order>, i64)> {
        self.list_where("seller_id", seller_id, page).await
    }

    async fn list_by_courier(
        &self,
        courier_id: Uuid,
        page: ListPage,
    ) -> Result<(Vec<Order>, i64)> {
        self.list_where("courier_id", courier_id, page).await
    }

    async fn transition(&self, id: Uuid, to: OrderStatus, notes: Option<String>) -> Result<Order> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderError::database("Failed to begin transaction", e))?;

        let mut order = self.lock_order(&mut tx, id).await?;
        apply_transition(&mut order, to, notes)?;
        self.store_transition(tx, &order).await?;
        Ok(order)
    }

    async fn assign_courier(&self, id: Uuid, courier_id: Uuid) -> Result<Order> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderError::database("Failed to begin transaction", e))?;

        let mut order = self.lock_order(&mut tx, id).await?;
        order.courier_id = Some(courier_id);
        apply_transition(&mut order, OrderStatus::Assigned, None)?;
        self.store_transition(tx, &order).await?;
        Ok(order)
    }

    async fn pay(&self, id: Uuid, payment_id: Uuid) -> Result<Order> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderError::database("Failed to begin transaction", e))?;

        let mut order = self.lock_order(&mut tx, id).await?;
        order.payment_id = Some(payment_id);
        apply_transition(&mut order, OrderStatus::Paid, None)?;
        self.store_transition(tx, &order).await?;
        Ok(order)
    }
}
