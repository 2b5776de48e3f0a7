//! Topic names and wire payload schemas.
//!
//! These are the cross-service contracts: the order service produces the
//! `order.*` payloads, the courier service consumes `order.paid` and produces
//! `courier.assigned`. All payloads are UTF-8 JSON.

use crate::geo::Location;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Topic names, one per event type.
pub mod topics {
    /// Order created, payment pending.
    pub const ORDER_CREATED: &str = "order.created";
    /// Order paid; triggers courier dispatch.
    pub const ORDER_PAID: &str = "order.paid";
    /// Courier assigned to the order (order-side status event).
    pub const ORDER_ASSIGNED: &str = "order.assigned";
    /// Courier picked up the order.
    pub const ORDER_PICKED_UP: &str = "order.picked_up";
    /// Courier is on the way to the customer.
    pub const ORDER_ON_THE_WAY: &str = "order.on_the_way";
    /// Order delivered.
    pub const ORDER_DELIVERED: &str = "order.delivered";
    /// Order canceled.
    pub const ORDER_CANCELED: &str = "order.canceled";
    /// Assignment decision made by the dispatcher.
    pub const COURIER_ASSIGNED: &str = "courier.assigned";
}

/// Vehicle a courier operates. Determines dispatch speed and prep time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    /// On foot.
    Walking,
    /// Bicycle.
    Bicycle,
    /// Motorbike.
    Motorbike,
    /// Car.
    Car,
}

impl VehicleType {
    /// Canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Walking => "WALKING",
            Self::Bicycle => "BICYCLE",
            Self::Motorbike => "MOTORBIKE",
            Self::Car => "CAR",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WALKING" => Ok(Self::Walking),
            "BICYCLE" => Ok(Self::Bicycle),
            "MOTORBIKE" => Ok(Self::Motorbike),
            "CAR" => Ok(Self::Car),
            other => Err(format!("unknown vehicle type: {other}")),
        }
    }
}

/// How an assignment was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    /// Nearest eligible courier won.
    Proximity,
    /// Fallback rotation over all online couriers.
    RoundRobin,
    /// Admin-chosen courier.
    Manual,
}

impl AssignmentMethod {
    /// Canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proximity => "proximity",
            Self::RoundRobin => "round_robin",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line item inside an order event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEventItem {
    /// Product id.
    pub product_id: Uuid,
    /// Product variant, when one was chosen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<Uuid>,
    /// Quantity ordered; always positive.
    pub quantity: i32,
    /// Price per unit at order time.
    pub unit_price: Decimal,
    /// `unit_price * quantity`.
    pub total_price: Decimal,
}

/// Payload published on every `order.*` topic.
///
/// The dispatch fields (`pickup_location`, `delivery_location`, `priority`,
/// `required_vehicle`) are populated on `order.paid`, where the courier
/// service needs them to build an assignment request; other order events
/// omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEventPayload {
    /// Order id (also the aggregate id / message key).
    pub order_id: Uuid,
    /// Customer who placed the order.
    pub customer_id: Uuid,
    /// Seller fulfilling the order.
    pub seller_id: Uuid,
    /// Order status after the change this event records.
    pub status: String,
    /// Grand total of the order.
    pub total_amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Line items.
    pub items: Vec<OrderEventItem>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Where the courier picks the order up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<Location>,
    /// Where the order is delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_location: Option<Location>,
    /// Dispatch priority, 1 (low) to 5 (urgent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Vehicle constraint for dispatch, when the order demands one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_vehicle: Option<VehicleType>,
}

/// Payload published on `courier.assigned` after a dispatch decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierAssignedEvent {
    /// The assignment record created.
    pub assignment_id: Uuid,
    /// Order the courier was assigned to.
    pub order_id: Uuid,
    /// The selected courier.
    pub courier_id: Uuid,
    /// Estimated minutes until delivery pickup completes.
    pub estimated_eta_minutes: i32,
    /// Which strategy selected the courier.
    pub assignment_method: AssignmentMethod,
    /// Courier-to-pickup distance at assignment time.
    pub distance_km: f64,
    /// When the assignment was made.
    pub timestamp: DateTime<Utc>,
}
