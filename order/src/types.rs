//! Domain types for the order service: carts, orders, the status state
//! machine and the outbox row.

use chrono::{DateTime, Utc};
use pazar_core::events::{self, OrderEventItem, OrderEventPayload, VehicleType};
use pazar_core::Location;
use pazar_outbox::OutboxEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order lifecycle status.
///
/// Transitions are restricted to the graph encoded in
/// [`OrderStatus::can_transition_to`]; `Delivered` and `Canceled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created, awaiting payment.
    Created,
    /// Payment captured; dispatch pending.
    Paid,
    /// A courier has been assigned.
    Assigned,
    /// The courier collected the order at the pickup point.
    PickedUp,
    /// The courier is en route to the customer.
    OnTheWay,
    /// Delivered to the customer.
    Delivered,
    /// Canceled; reachable from every non-terminal state.
    Canceled,
}

impl OrderStatus {
    /// Whether the `self → to` edge exists in the transition graph.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::Paid | Self::Canceled)
                | (Self::Paid, Self::Assigned | Self::Canceled)
                | (Self::Assigned, Self::PickedUp | Self::Canceled)
                | (Self::PickedUp, Self::OnTheWay | Self::Canceled)
                | (Self::OnTheWay, Self::Delivered | Self::Canceled)
        )
    }

    /// Terminal states absorb: no edges leave them.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }

    /// Canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Paid => "PAID",
            Self::Assigned => "ASSIGNED",
            Self::PickedUp => "PICKED_UP",
            Self::OnTheWay => "ON_THE_WAY",
            Self::Delivered => "DELIVERED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Topic an event for this status is published on.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Self::Created => events::topics::ORDER_CREATED,
            Self::Paid => events::topics::ORDER_PAID,
            Self::Assigned => events::topics::ORDER_ASSIGNED,
            Self::PickedUp => events::topics::ORDER_PICKED_UP,
            Self::OnTheWay => events::topics::ORDER_ON_THE_WAY,
            Self::Delivered => events::topics::ORDER_DELIVERED,
            Self::Canceled => events::topics::ORDER_CANCELED,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "PAID" => Ok(Self::Paid),
            "ASSIGNED" => Ok(Self::Assigned),
            "PICKED_UP" => Ok(Self::PickedUp),
            "ON_THE_WAY" => Ok(Self::OnTheWay),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// A postal address with coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// Street line.
    pub street: String,
    /// City.
    pub city: String,
    /// District within the city.
    pub district: String,
    /// Postal code, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// Country.
    pub country: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Address {
    /// The coordinate point of this address.
    #[must_use]
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            address: Some(format!("{}, {}, {}", self.street, self.district, self.city)),
        }
    }
}

/// A customer's shopping cart.
///
/// The first item pins `seller_id`; later items from another seller are
/// rejected so the resulting order always has a single seller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    /// Cart id.
    pub id: Uuid,
    /// Owning customer; one cart per customer.
    pub customer_id: Uuid,
    /// Seller the cart is pinned to, once it has an item.
    pub seller_id: Option<Uuid>,
    /// Items in the cart.
    pub items: Vec<CartItem>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// One cart line.
///
/// Carries a snapshot of the catalog data pricing needs (`unit_price`,
/// `is_express`, `preparation_minutes`) captured when the item was added, so
/// checkout never calls back into the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    /// Item id.
    pub id: Uuid,
    /// Cart this item belongs to.
    pub cart_id: Uuid,
    /// Product id.
    pub product_id: Uuid,
    /// Product variant, when one was chosen.
    pub variant_id: Option<Uuid>,
    /// Seller offering the product.
    pub seller_id: Uuid,
    /// Quantity; always positive.
    pub quantity: i32,
    /// Price per unit at add time.
    pub unit_price: Decimal,
    /// Whether the product ships with express delivery.
    pub is_express: bool,
    /// Seller preparation time for this product, in minutes.
    pub preparation_minutes: i32,
    /// Customer note for this line.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A customer order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order id; the aggregate id all order events key on.
    pub id: Uuid,
    /// Customer who placed the order.
    pub customer_id: Uuid,
    /// Seller fulfilling the order.
    pub seller_id: Uuid,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Line items.
    pub items: Vec<OrderItem>,
    /// Sum of `unit_price * quantity` over the items.
    pub subtotal: Decimal,
    /// Tax on the subtotal.
    pub tax_amount: Decimal,
    /// Delivery fee (express when any item is express).
    pub delivery_fee: Decimal,
    /// Fee charged when the subtotal is under the minimum order amount.
    pub small_cart_fee: Decimal,
    /// Coupon discount.
    pub discount_amount: Decimal,
    /// `subtotal + tax + delivery_fee + small_cart_fee - discount`.
    /// Computed at creation, never mutated afterwards.
    pub total_amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Where the order is delivered.
    pub delivery_address: Address,
    /// Where the courier picks the order up.
    pub pickup_address: Address,
    /// Estimate computed at creation from item preparation times.
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    /// Set exactly when the order reaches `DELIVERED`.
    pub actual_delivery_time: Option<DateTime<Utc>>,
    /// Courier assigned to the order, once there is one.
    pub courier_id: Option<Uuid>,
    /// Payment reference, set when payment is processed.
    pub payment_id: Option<Uuid>,
    /// Coupon code the customer applied, if any.
    pub coupon_code: Option<String>,
    /// Dispatch priority, 1 (low) to 5 (urgent).
    pub priority: i32,
    /// Vehicle constraint for dispatch, when the order demands one.
    pub required_vehicle: Option<VehicleType>,
    /// Free-form notes, appended on status changes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build the wire payload for an event recording this order's current
    /// status.
    ///
    /// The dispatch fields are only populated on `order.paid`, where the
    /// courier service needs them.
    #[must_use]
    pub fn event_payload(&self) -> OrderEventPayload {
        let dispatch = self.status == OrderStatus::Paid;
        OrderEventPayload {
            order_id: self.id,
            customer_id: self.customer_id,
            seller_id: self.seller_id,
            status: self.status.as_str().to_string(),
            total_amount: self.total_amount,
            currency: self.currency.clone(),
            items: self
                .items
                .iter()
                .map(|item| OrderEventItem {
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                })
                .collect(),
            timestamp: Utc::now(),
            pickup_location: dispatch.then(|| self.pickup_address.location()),
            delivery_location: dispatch.then(|| self.delivery_address.location()),
            priority: dispatch.then_some(self.priority),
            required_vehicle: if dispatch { self.required_vehicle } else { None },
        }
    }
}

/// One order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    /// Item id.
    pub id: Uuid,
    /// Order this item belongs to.
    pub order_id: Uuid,
    /// Product id.
    pub product_id: Uuid,
    /// Product variant, when one was chosen.
    pub variant_id: Option<Uuid>,
    /// Quantity; always positive.
    pub quantity: i32,
    /// Price per unit at order time.
    pub unit_price: Decimal,
    /// `unit_price * quantity`.
    pub total_price: Decimal,
    /// Customer note for this line.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// The outbox row recording this order's current status.
    ///
    /// Written by the stores inside the same transaction as the status
    /// change itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized to JSON.
    pub fn outbox_event(&self) -> Result<OutboxEvent, serde_json::Error> {
        OutboxEvent::new(self.id, self.status.topic(), &self.event_payload())
    }
}

// ============================================================================
// Request / response DTOs
// ============================================================================

/// Request to add an item to a cart.
///
/// Carries the catalog snapshot for the product (price, express flag,
/// preparation time) as resolved by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct AddToCartRequest {
    /// Product to add.
    pub product_id: Uuid,
    /// Chosen variant, if any.
    pub variant_id: Option<Uuid>,
    /// Seller offering the product.
    pub seller_id: Uuid,
    /// Quantity; must be positive.
    pub quantity: i32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Whether the product ships express.
    #[serde(default)]
    pub is_express: bool,
    /// Seller preparation time in minutes.
    #[serde(default)]
    pub preparation_minutes: i32,
    /// Customer note.
    pub notes: Option<String>,
}

/// Request to update a cart line.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCartItemRequest {
    /// New quantity; must be positive.
    pub quantity: i32,
    /// Replacement note.
    pub notes: Option<String>,
}

/// Request to convert the customer's cart into an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    /// Delivery address.
    pub delivery_address: Address,
    /// Pickup address (the seller's location, resolved by the caller).
    pub pickup_address: Address,
    /// Optional coupon code.
    pub coupon_code: Option<String>,
    /// Dispatch priority, 1 (low) to 5 (urgent). Defaults to 1.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Vehicle constraint for dispatch, if the order demands one.
    pub required_vehicle: Option<VehicleType>,
    /// Free-form note.
    pub notes: Option<String>,
}

const fn default_priority() -> i32 {
    1
}

/// Request to move an order to a new status.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    /// Target status.
    pub status: OrderStatus,
    /// Note recorded with the change.
    pub notes: Option<String>,
}

/// Request to assign a courier to an order.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignCourierRequest {
    /// The courier to assign.
    pub courier_id: Uuid,
}

/// Request to pay for an order.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessPaymentRequest {
    /// Payment method reference from the payment provider.
    pub payment_method_id: String,
}

/// Monetary summary of a cart, using the same math as order creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummary {
    /// Total number of units across all lines.
    pub item_count: i32,
    /// Sum of `unit_price * quantity`.
    pub subtotal: Decimal,
    /// Tax on the subtotal.
    pub tax_amount: Decimal,
    /// Delivery fee (express when any item is express).
    pub delivery_fee: Decimal,
    /// Fee when the subtotal is under the minimum order amount.
    pub small_cart_fee: Decimal,
    /// Coupon discount.
    pub discount_amount: Decimal,
    /// Grand total.
    pub total_amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Seller the cart is pinned to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 7] = [
        OrderStatus::Created,
        OrderStatus::Paid,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::OnTheWay,
        OrderStatus::Delivered,
        OrderStatus::Canceled,
    ];

    #[test]
    fn happy_path_is_a_valid_chain() {
        let path = [
            OrderStatus::Created,
            OrderStatus::Paid,
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
            OrderStatus::OnTheWay,
            OrderStatus::Delivered,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn every_non_terminal_state_can_cancel() {
        for status in ALL {
            if !status.is_terminal() {
                assert!(status.can_transition_to(OrderStatus::Canceled));
            }
        }
    }

    #[test]
    fn terminal_states_absorb() {
        for from in [OrderStatus::Delivered, OrderStatus::Canceled] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn no_backward_or_skipping_edges() {
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Created));
        assert!(!OrderStatus::OnTheWay.can_transition_to(OrderStatus::PickedUp));
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Created));
    }

    #[test]
    fn status_round_trips_through_wire_form() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_topics_match_event_names() {
        assert_eq!(OrderStatus::Paid.topic(), "order.paid");
        assert_eq!(OrderStatus::PickedUp.topic(), "order.picked_up");
        assert_eq!(OrderStatus::Canceled.topic(), "order.canceled");
    }
}
