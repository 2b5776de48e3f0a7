//! The order service: carts, checkout and the order state machine.
//!
//! This is the component boundary the HTTP layer and tests talk to. It
//! validates input, runs the monetary computation, and delegates persistence
//! to the stores, which in turn guarantee that every order change lands
//! atomically with its outbox event.

use crate::error::{OrderError, Result};
use crate::pricing::{self, PricingConfig};
use crate::promotions::PromotionClient;
use crate::stores::{CartStore, ListPage, OrderStore};
use crate::types::{
    AddToCartRequest, Cart, CartItem, CartSummary, CreateOrderRequest, Order, OrderItem,
    OrderStatus, UpdateCartItemRequest,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Order service facade.
pub struct OrderService {
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    promotions: Arc<dyn PromotionClient>,
    pricing: PricingConfig,
}

impl OrderService {
    /// Wire the service from its stores and business parameters.
    pub fn new(
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        promotions: Arc<dyn PromotionClient>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            carts,
            orders,
            promotions,
            pricing,
        }
    }

    // ========================================================================
    // Cart operations
    // ========================================================================

    /// The customer's cart, created empty if they have none.
    pub async fn get_cart(&self, customer_id: Uuid) -> Result<Cart> {
        self.carts.get_or_create(customer_id).await
    }

    /// Add an item to the customer's cart.
    ///
    /// Rejects items from a second seller: an order is always single-seller,
    /// and the cart enforces that upstream.
    pub async fn add_to_cart(&self, customer_id: Uuid, req: AddToCartRequest) -> Result<CartItem> {
        if req.quantity <= 0 {
            return Err(OrderError::Validation("quantity must be positive".into()));
        }
        if req.unit_price < Decimal::ZERO {
            return Err(OrderError::Validation("unit price cannot be negative".into()));
        }

        let cart = self.carts.get_or_create(customer_id).await?;
        if let Some(seller_id) = cart.seller_id {
            if seller_id != req.seller_id {
                return Err(OrderError::MultiSellerCart);
            }
        }

        let now = Utc::now();
        let item = CartItem {
            id: Uuid::new_v4(),
            cart_id: cart.id,
            product_id: req.product_id,
            variant_id: req.variant_id,
            seller_id: req.seller_id,
            quantity: req.quantity,
            unit_price: req.unit_price,
            is_express: req.is_express,
            preparation_minutes: req.preparation_minutes,
            notes: req.notes,
            created_at: now,
            updated_at: now,
        };

        self.carts.add_item(item).await
    }

    /// Update a line in the customer's cart.
    pub async fn update_cart_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
        req: UpdateCartItemRequest,
    ) -> Result<()> {
        if req.quantity <= 0 {
            return Err(OrderError::Validation("quantity must be positive".into()));
        }

        let cart = self
            .carts
            .get_by_customer(customer_id)
            .await?
            .ok_or(OrderError::NotFound("Cart"))?;

        self.carts
            .update_item(cart.id, item_id, req.quantity, req.notes)
            .await
    }

    /// Remove a line from the customer's cart.
    pub async fn remove_from_cart(&self, customer_id: Uuid, item_id: Uuid) -> Result<()> {
        let cart = self
            .carts
            .get_by_customer(customer_id)
            .await?
            .ok_or(OrderError::NotFound("Cart"))?;
        self.carts.remove_item(cart.id, item_id).await
    }

    /// Empty the customer's cart.
    pub async fn clear_cart(&self, customer_id: Uuid) -> Result<()> {
        let cart = self
            .carts
            .get_by_customer(customer_id)
            .await?
            .ok_or(OrderError::NotFound("Cart"))?;
        self.carts.clear(cart.id).await
    }

    /// Monetary summary of the customer's cart, using the same math as
    /// checkout.
    pub async fn cart_summary(&self, customer_id: Uuid) -> Result<CartSummary> {
        let cart = self.carts.get_or_create(customer_id).await?;
        Ok(pricing::summarize(&cart.items, cart.seller_id, &self.pricing))
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    /// Convert the customer's cart into an order.
    ///
    /// Computes the monetary fields, resolves the coupon (proceeding without
    /// a discount if the promotion service fails), persists the order with
    /// its `order.created` event, and clears the cart.
    pub async fn create_order(&self, customer_id: Uuid, req: CreateOrderRequest) -> Result<Order> {
        if !(1..=5).contains(&req.priority) {
            return Err(OrderError::Validation(
                "priority must be between 1 and 5".into(),
            ));
        }

        let cart = self
            .carts
            .get_by_customer(customer_id)
            .await?
            .ok_or(OrderError::EmptyCart)?;

        if cart.items.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let seller_id = cart.seller_id.ok_or(OrderError::EmptyCart)?;
        if cart.items.iter().any(|item| item.seller_id != seller_id) {
            return Err(OrderError::MultiSellerCart);
        }

        let mut summary = pricing::summarize(&cart.items, cart.seller_id, &self.pricing);

        if let Some(code) = &req.coupon_code {
            match self.promotions.resolve_discount(code, summary.subtotal).await {
                Ok(discount) => summary = pricing::apply_discount(summary, discount),
                Err(err) => {
                    warn!(coupon = %code, error = %err, "Coupon resolution failed, proceeding without discount");
                }
            }
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let items: Vec<OrderItem> = cart
            .items
            .iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.unit_price * Decimal::from(item.quantity),
                notes: item.notes.clone(),
                created_at: now,
            })
            .collect();

        let order = Order {
            id: order_id,
            customer_id,
            seller_id,
            status: OrderStatus::Created,
            items,
            subtotal: summary.subtotal,
            tax_amount: summary.tax_amount,
            delivery_fee: summary.delivery_fee,
            small_cart_fee: summary.small_cart_fee,
            discount_amount: summary.discount_amount,
            total_amount: summary.total_amount,
            currency: summary.currency.clone(),
            delivery_address: req.delivery_address,
            pickup_address: req.pickup_address,
            estimated_delivery_time: Some(pricing::estimated_delivery_time(&cart.items, now)),
            actual_delivery_time: None,
            courier_id: None,
            payment_id: None,
            coupon_code: req.coupon_code,
            priority: req.priority,
            required_vehicle: req.required_vehicle,
            notes: req.notes,
            created_at: now,
            updated_at: now,
        };

        self.orders.create(&order).await?;

        if let Err(err) = self.carts.clear(cart.id).await {
            warn!(order_id = %order.id, error = %err, "Failed to clear cart after checkout");
        }

        info!(
            order_id = %order.id,
            customer_id = %customer_id,
            total = %order.total_amount,
            "Order created"
        );
        Ok(order)
    }

    // ========================================================================
    // Order operations
    // ========================================================================

    /// Fetch an order.
    pub async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.orders.get(id).await?.ok_or(OrderError::NotFound("Order"))
    }

    /// Orders for a customer, newest first.
    pub async fn orders_for_customer(
        &self,
        customer_id: Uuid,
        page: ListPage,
    ) -> Result<(Vec<Order>, i64)> {
        self.orders.list_by_customer(customer_id, page).await
    }

    /// Orders for a seller, newest first.
    pub async fn orders_for_seller(
        &self,
        seller_id: Uuid,
        page: ListPage,
    ) -> Result<(Vec<Order>, i64)> {
        self.orders.list_by_seller(seller_id, page).await
    }

    /// Orders for a courier, newest first.
    pub async fn orders_for_courier(
        &self,
        courier_id: Uuid,
        page: ListPage,
    ) -> Result<(Vec<Order>, i64)> {
        self.orders.list_by_courier(courier_id, page).await
    }

    /// Move an order to a new status.
    ///
    /// Rejects edges not in the transition graph with
    /// [`OrderError::InvalidTransition`]; the matching status event is
    /// written in the same transaction as the change.
    pub async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        notes: Option<String>,
    ) -> Result<Order> {
        let order = self.orders.transition(id, status, notes).await?;
        info!(order_id = %id, status = %status, "Order status updated");
        Ok(order)
    }

    /// Record the courier on the order and move it to `ASSIGNED`.
    pub async fn assign_courier(&self, id: Uuid, courier_id: Uuid) -> Result<Order> {
        let order = self.orders.assign_courier(id, courier_id).await?;
        info!(order_id = %id, courier_id = %courier_id, "Courier assigned to order");
        Ok(order)
    }

    /// Capture payment for an order in `CREATED` and move it to `PAID`.
    ///
    /// Mints a payment id; the actual charge happens in the external payment
    /// service keyed by `payment_method_id`.
    pub async fn process_payment(&self, id: Uuid, payment_method_id: &str) -> Result<Order> {
        let payment_id = Uuid::new_v4();
        let order = self.orders.pay(id, payment_id).await?;
        info!(
            order_id = %id,
            payment_id = %payment_id,
            payment_method = %payment_method_id,
            "Payment processed"
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promotions::{FailingPromotionClient, FlatRatePromotion, NoopPromotionClient};
    use crate::stores::{InMemoryCartStore, InMemoryOrderStore};
    use crate::types::Address;
    use rust_decimal_macros::dec;

    fn pricing_config() -> PricingConfig {
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
            postal_code: Some("34430".to_string()),
            country: "Turkey".to_string(),
            latitude: 41.0336,
            longitude: 28.9770,
        }
    }

    fn create_request() -> CreateOrderRequest {
        CreateOrderRequest {
            delivery_address: address(),
            pickup_address: address(),
            coupon_code: None,
            priority: 1,
            required_vehicle: None,
            notes: None,
        }
    }

    fn add_request(seller_id: Uuid, unit_price: Decimal) -> AddToCartRequest {
        AddToCartRequest {
            product_id: Uuid::new_v4(),
            variant_id: None,
            seller_id,
            quantity: 1,
            unit_price,
            is_express: false,
            preparation_minutes: 10,
            notes: None,
        }
    }

    struct Fixture {
        service: OrderService,
        orders: InMemoryOrderStore,
    }

    fn fixture_with(promotions: Arc<dyn PromotionClient>) -> Fixture {
        let orders = InMemoryOrderStore::new();
        let service = OrderService::new(
            Arc::new(InMemoryCartStore::new()),
            Arc::new(orders.clone()),
            promotions,
            pricing_config(),
        );
        Fixture { service, orders }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(NoopPromotionClient))
    }

    #[tokio::test]
    async fn checkout_then_payment_writes_two_outbox_rows() {
        let Fixture { service, orders } = fixture();
        let customer = Uuid::new_v4();
        let seller = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(seller, dec!(20.00)))
            .await
            .unwrap();
        service
            .add_to_cart(customer, add_request(seller, dec!(30.00)))
            .await
            .unwrap();

        let order = service.create_order(customer, create_request()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.subtotal, dec!(50.00));
        assert_eq!(order.tax_amount, dec!(9.00));
        assert_eq!(order.delivery_fee, dec!(10.00));
        assert_eq!(order.small_cart_fee, dec!(0));
        assert_eq!(order.total_amount, dec!(69.00));

        let rows = orders.outbox_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "order.created");
        assert_eq!(rows[0].aggregate_id, order.id);

        let paid = service.process_payment(order.id, "pm_123").await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        assert!(paid.payment_id.is_some());

        let rows = orders.outbox_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].event_type, "order.paid");
    }

    #[tokio::test]
    async fn paid_event_carries_dispatch_fields() {
        let Fixture { service, orders } = fixture();
        let customer = Uuid::new_v4();
        let seller = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(seller, dec!(60.00)))
            .await
            .unwrap();
        let order = service.create_order(customer, create_request()).await.unwrap();
        service.process_payment(order.id, "pm_1").await.unwrap();

        let rows = orders.outbox_rows();
        let paid = &rows[1].event_data;
        assert!(paid.get("pickup_location").is_some());
        assert!(paid.get("delivery_location").is_some());
        assert_eq!(paid["priority"], 1);

        // The created event carries none of them.
        assert!(rows[0].event_data.get("pickup_location").is_none());
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_and_writes_nothing() {
        let Fixture { service, orders } = fixture();
        let customer = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(Uuid::new_v4(), dec!(60.00)))
            .await
            .unwrap();
        let order = service.create_order(customer, create_request()).await.unwrap();
        let rows_before = orders.outbox_rows().len();

        let err = service
            .update_order_status(order.id, OrderStatus::Delivered, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Created,
                to: OrderStatus::Delivered
            }
        );

        let unchanged = service.get_order(order.id).await.unwrap();
        assert_eq!(unchanged.status, OrderStatus::Created);
        assert_eq!(orders.outbox_rows().len(), rows_before);
    }

    #[tokio::test]
    async fn payment_requires_created_status() {
        let Fixture { service, .. } = fixture();
        let customer = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(Uuid::new_v4(), dec!(60.00)))
            .await
            .unwrap();
        let order = service.create_order(customer, create_request()).await.unwrap();
        service.process_payment(order.id, "pm_1").await.unwrap();

        let err = service.process_payment(order.id, "pm_2").await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn second_seller_is_rejected() {
        let Fixture { service, .. } = fixture();
        let customer = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(Uuid::new_v4(), dec!(10.00)))
            .await
            .unwrap();
        let err = service
            .add_to_cart(customer, add_request(Uuid::new_v4(), dec!(10.00)))
            .await
            .unwrap_err();
        assert_eq!(err, OrderError::MultiSellerCart);
    }

    #[tokio::test]
    async fn empty_cart_cannot_check_out() {
        let Fixture { service, .. } = fixture();
        let customer = Uuid::new_v4();
        service.get_cart(customer).await.unwrap();

        let err = service.create_order(customer, create_request()).await.unwrap_err();
        assert_eq!(err, OrderError::EmptyCart);
    }

    #[tokio::test]
    async fn coupon_discount_lands_in_the_total() {
        let Fixture { service, .. } = fixture_with(Arc::new(FlatRatePromotion::new(dec!(10))));
        let customer = Uuid::new_v4();
        let seller = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(seller, dec!(50.00)))
            .await
            .unwrap();
        let mut req = create_request();
        req.coupon_code = Some("WELCOME".to_string());

        let order = service.create_order(customer, req).await.unwrap();
        assert_eq!(order.discount_amount, dec!(5.00));
        // 50 + 9 tax + 10 delivery - 5 discount
        assert_eq!(order.total_amount, dec!(64.00));
    }

    #[tokio::test]
    async fn coupon_failure_proceeds_without_discount() {
        let Fixture { service, .. } = fixture_with(Arc::new(FailingPromotionClient));
        let customer = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(Uuid::new_v4(), dec!(50.00)))
            .await
            .unwrap();
        let mut req = create_request();
        req.coupon_code = Some("WELCOME".to_string());

        let order = service.create_order(customer, req).await.unwrap();
        assert_eq!(order.discount_amount, dec!(0));
        assert_eq!(order.total_amount, dec!(69.00));
    }

    #[tokio::test]
    async fn checkout_clears_the_cart() {
        let Fixture { service, .. } = fixture();
        let customer = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(Uuid::new_v4(), dec!(60.00)))
            .await
            .unwrap();
        service.create_order(customer, create_request()).await.unwrap();

        let cart = service.get_cart(customer).await.unwrap();
        assert!(cart.items.is_empty());
        assert!(cart.seller_id.is_none());
    }

    #[tokio::test]
    async fn full_lifecycle_emits_an_event_per_transition() {
        let Fixture { service, orders } = fixture();
        let customer = Uuid::new_v4();

        service
            .add_to_cart(customer, add_request(Uuid::new_v4(), dec!(60.00)))
            .await
            .unwrap();
        let order = service.create_order(customer, create_request()).await.unwrap();
        service.process_payment(order.id, "pm_1").await.unwrap();
        service.assign_courier(order.id, Uuid::new_v4()).await.unwrap();
        service
            .update_order_status(order.id, OrderStatus::PickedUp, None)
            .await
            .unwrap();
        service
            .update_order_status(order.id, OrderStatus::OnTheWay, None)
            .await
            .unwrap();
        let delivered = service
            .update_order_status(order.id, OrderStatus::Delivered, None)
            .await
            .unwrap();

        assert!(delivered.actual_delivery_time.is_some());

        let types: Vec<String> = orders
            .outbox_rows()
            .iter()
            .map(|e| e.event_type.clone())
            .collect();
        assert_eq!(
            types,
            vec![
                "order.created",
                "order.paid",
                "order.assigned",
                "order.picked_up",
                "order.on_the_way",
                "order.delivered"
            ]
        );
    }
}
