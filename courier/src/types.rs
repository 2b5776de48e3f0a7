//! Domain types for the courier service: couriers, assignments, location
//! samples and the dispatch request/response pair.

use chrono::{DateTime, Datelike, Timelike, Utc};
use pazar_core::events::{AssignmentMethod, VehicleType};
use pazar_core::Location;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Courier availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourierStatus {
    /// Available for dispatch.
    Active,
    /// Registered but not working.
    Inactive,
    /// Currently carrying an order.
    Busy,
    /// Not reachable; location data went stale.
    Offline,
    /// Temporarily excluded from dispatch (e.g. by support).
    Unavailable,
}

impl CourierStatus {
    /// Canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Busy => "BUSY",
            Self::Offline => "OFFLINE",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for CourierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourierStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "BUSY" => Ok(Self::Busy),
            "OFFLINE" => Ok(Self::Offline),
            "UNAVAILABLE" => Ok(Self::Unavailable),
            other => Err(format!("unknown courier status: {other}")),
        }
    }
}

/// Assignment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    /// Offered to the courier, awaiting response.
    Pending,
    /// Courier accepted; delivery in progress.
    Accepted,
    /// Courier declined.
    Rejected,
    /// Delivery finished.
    Completed,
    /// Withdrawn before completion.
    Canceled,
}

impl AssignmentStatus {
    /// Whether the `self → to` edge is allowed.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Accepted | Self::Rejected | Self::Canceled)
                | (Self::Accepted, Self::Completed | Self::Canceled)
        )
    }

    /// Whether this status ends the assignment.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Canceled)
    }

    /// Canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(format!("unknown assignment status: {other}")),
        }
    }
}

/// A delivery courier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    /// Courier id.
    pub id: Uuid,
    /// Platform user account backing this courier.
    pub user_id: Uuid,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Contact phone.
    pub phone: String,
    /// Contact email.
    pub email: String,
    /// Vehicle the courier operates.
    pub vehicle_type: VehicleType,
    /// License plate, for motorized vehicles.
    pub vehicle_plate: Option<String>,
    /// Availability status.
    pub status: CourierStatus,
    /// Average rating, 0.00 to 5.00.
    pub rating: Decimal,
    /// Lifetime completed deliveries.
    pub completed_orders: i32,
    /// Whether the courier's app reports them online.
    pub is_online: bool,
    /// Last time the courier was seen (location update or going online).
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    /// Basic dispatch eligibility, before geography is considered.
    #[must_use]
    pub fn is_available_for_assignment(&self) -> bool {
        self.status == CourierStatus::Active && self.is_online
    }
}

/// A dispatch candidate: a courier plus their fresh location and the
/// distance to the pickup point.
#[derive(Debug, Clone, Serialize)]
pub struct CourierCandidate {
    /// The courier.
    pub courier: Courier,
    /// Their current location.
    pub location: Location,
    /// Straight-line distance to the pickup point, in kilometers.
    pub distance_km: f64,
}

/// A geodesic circle a courier serves. When a courier has any active areas,
/// pickups outside all of them are ineligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceArea {
    /// Area id.
    pub id: Uuid,
    /// Owning courier.
    pub courier_id: Uuid,
    /// Circle center latitude.
    pub center_lat: f64,
    /// Circle center longitude.
    pub center_lng: f64,
    /// Circle radius in kilometers.
    pub radius_km: f64,
    /// City label.
    pub city: String,
    /// District label.
    pub district: String,
    /// Whether the area currently applies.
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A weekly working-hours window (`HH:MM` strings, day 0 = Sunday). When a
/// courier has any windows, dispatch outside all of them is ineligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    /// Window id.
    pub id: Uuid,
    /// Owning courier.
    pub courier_id: Uuid,
    /// Day of week, 0 = Sunday through 6 = Saturday.
    pub day_of_week: i32,
    /// Window start, `HH:MM`.
    pub start_time: String,
    /// Window end, `HH:MM`.
    pub end_time: String,
}

/// Whether `point` falls inside any active area.
#[must_use]
pub fn in_service_area(point: &Location, areas: &[ServiceArea]) -> bool {
    areas.iter().filter(|a| a.is_active).any(|area| {
        let center = Location::new(area.center_lat, area.center_lng);
        point.distance_km(&center) <= area.radius_km
    })
}

/// Whether `at` falls inside any window. Times compare lexically, which is
/// correct for zero-padded `HH:MM`.
#[must_use]
pub fn is_working_at(windows: &[WorkingHours], at: DateTime<Utc>) -> bool {
    let day = at.weekday().num_days_from_sunday() as i32;
    let time = format!("{:02}:{:02}", at.hour(), at.minute());
    windows
        .iter()
        .any(|w| w.day_of_week == day && w.start_time <= time && time <= w.end_time)
}

/// A courier assignment to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// Assignment id.
    pub id: Uuid,
    /// Order being delivered. At most one live assignment per order.
    pub order_id: Uuid,
    /// Courier carrying it.
    pub courier_id: Uuid,
    /// Lifecycle status.
    pub status: AssignmentStatus,
    /// Where to collect the order.
    pub pickup_location: Location,
    /// Where to deliver it.
    pub delivery_location: Location,
    /// Courier-to-pickup distance at assignment time, kilometers.
    pub estimated_distance_km: f64,
    /// ETA in minutes at assignment time.
    pub estimated_duration_min: i32,
    /// Distance actually traveled, once known.
    pub actual_distance_km: Option<f64>,
    /// Minutes actually taken, once known.
    pub actual_duration_min: Option<i32>,
    /// When the courier accepted.
    pub accepted_at: Option<DateTime<Utc>>,
    /// When the courier rejected.
    pub rejected_at: Option<DateTime<Utc>>,
    /// When the delivery completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form notes (dispatch reason, admin comments).
    pub notes: Option<String>,
    /// Creation (= assignment) time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// One accepted location sample from a courier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierLocationUpdate {
    /// Reporting courier.
    pub courier_id: Uuid,
    /// The sample.
    pub location: Location,
    /// Speed in km/h, when the device reports it.
    pub speed: Option<f64>,
    /// Heading in degrees, when the device reports it.
    pub heading: Option<f64>,
    /// GPS accuracy in meters, when the device reports it.
    pub accuracy: Option<f64>,
    /// Device-side sample time.
    pub timestamp: DateTime<Utc>,
}

/// The cached current-location entry (`courier:location:{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierLocationSnapshot {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Free-form address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Speed in km/h.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Heading in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// GPS accuracy in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Sample time.
    pub timestamp: DateTime<Utc>,
}

impl CourierLocationSnapshot {
    /// The coordinate point of this snapshot.
    #[must_use]
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            address: self.address.clone(),
        }
    }
}

/// A message on the per-order live tracking channel
/// (`courier:location:{order_id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingUpdate {
    /// The tracked order.
    pub order_id: Uuid,
    /// The courier carrying it.
    pub courier_id: Uuid,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Heading in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Speed in km/h.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// GPS accuracy in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Sample time.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Request / response DTOs
// ============================================================================

/// Request to register a courier.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourierRequest {
    /// Backing user account.
    pub user_id: Uuid,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Contact phone.
    pub phone: String,
    /// Contact email.
    pub email: String,
    /// Vehicle the courier operates.
    pub vehicle_type: VehicleType,
    /// License plate, for motorized vehicles.
    pub vehicle_plate: Option<String>,
}

/// Partial courier update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCourierRequest {
    /// New first name.
    pub first_name: Option<String>,
    /// New last name.
    pub last_name: Option<String>,
    /// New phone.
    pub phone: Option<String>,
    /// New email.
    pub email: Option<String>,
    /// New vehicle.
    pub vehicle_type: Option<VehicleType>,
    /// New plate.
    pub vehicle_plate: Option<String>,
}

/// Body of `PUT /couriers/{id}/location`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLocationRequest {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Free-form address.
    pub address: Option<String>,
    /// Speed in km/h.
    pub speed: Option<f64>,
    /// Heading in degrees.
    pub heading: Option<f64>,
    /// GPS accuracy in meters.
    pub accuracy: Option<f64>,
}

/// A dispatch request: assign a courier to a paid order.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignOrderRequest {
    /// The order to assign.
    pub order_id: Uuid,
    /// Where the courier collects the order.
    pub pickup_location: Location,
    /// Where the order goes.
    pub delivery_location: Location,
    /// Priority, 1 (low) to 5 (urgent).
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Only couriers with this vehicle qualify, when set.
    pub required_vehicle: Option<VehicleType>,
    /// Tighter-than-default search radius, kilometers.
    pub max_distance_km: Option<f64>,
    /// Dispatch note recorded on the assignment.
    pub notes: Option<String>,
}

const fn default_priority() -> i32 {
    1
}

/// Admin request to assign a specific courier.
///
/// Pickup and delivery locations are required: the assignment row stores
/// them and the courier app needs both.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualAssignRequest {
    /// The order to assign.
    pub order_id: Uuid,
    /// The chosen courier.
    pub courier_id: Uuid,
    /// Where the courier collects the order.
    pub pickup_location: Location,
    /// Where the order goes.
    pub delivery_location: Location,
    /// Why dispatch was overridden; recorded on the assignment.
    pub reason: String,
}

/// Availability probe: which couriers could serve this point right now.
#[derive(Debug, Clone, Deserialize)]
pub struct CourierAvailabilityRequest {
    /// The point to serve.
    pub location: Location,
    /// Search radius override, kilometers.
    pub max_distance_km: Option<f64>,
    /// Vehicle filter.
    pub vehicle_type: Option<VehicleType>,
}

/// Request to move an assignment to a new status.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAssignmentStatusRequest {
    /// Target status.
    pub status: AssignmentStatus,
    /// Note recorded with the change.
    pub notes: Option<String>,
}

/// Request to set a courier's availability status.
#[derive(Debug, Clone, Deserialize)]
pub struct SetStatusRequest {
    /// The new status.
    pub status: CourierStatus,
}

/// Request to flip a courier's online flag.
#[derive(Debug, Clone, Deserialize)]
pub struct SetOnlineRequest {
    /// Whether the courier is online.
    pub is_online: bool,
}

/// Request to add a service area to a courier.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateServiceAreaRequest {
    /// Circle center latitude.
    pub center_lat: f64,
    /// Circle center longitude.
    pub center_lng: f64,
    /// Circle radius in kilometers.
    pub radius_km: f64,
    /// City label.
    pub city: String,
    /// District label.
    pub district: String,
}

/// Request to add a weekly working-hours window.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkingHoursRequest {
    /// Day of week, 0 = Sunday through 6 = Saturday.
    pub day_of_week: i32,
    /// Window start, `HH:MM`.
    pub start_time: String,
    /// Window end, `HH:MM`.
    pub end_time: String,
}

/// How a dispatch call ended, successful or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTag {
    /// Nearest eligible courier won.
    Proximity,
    /// Fallback rotation picked the courier.
    RoundRobin,
    /// Admin chose the courier.
    Manual,
    /// Admission control refused: too many in-flight assignments.
    Overloaded,
    /// Admission control refused: rate limit.
    RateLimited,
    /// No eligible courier found by any strategy.
    NoCourier,
}

impl From<AssignmentMethod> for DispatchTag {
    fn from(method: AssignmentMethod) -> Self {
        match method {
            AssignmentMethod::Proximity => Self::Proximity,
            AssignmentMethod::RoundRobin => Self::RoundRobin,
            AssignmentMethod::Manual => Self::Manual,
        }
    }
}

/// Outcome of a dispatch call.
///
/// Admission-control refusals and empty candidate pools are *unsuccessful
/// responses*, not errors: the caller may retry.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentResponse {
    /// Whether a courier was assigned.
    pub success: bool,
    /// Short human-readable outcome.
    pub message: String,
    /// The created assignment, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    /// ETA in minutes, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_eta_minutes: Option<i32>,
    /// How the call ended.
    pub method: DispatchTag,
    /// Wall-clock milliseconds the call took.
    pub processing_ms: i64,
}

/// Aggregate delivery statistics for one courier.
#[derive(Debug, Clone, Serialize)]
pub struct CourierPerformanceStats {
    /// The courier.
    pub courier_id: Uuid,
    /// All assignments ever offered.
    pub total_assignments: i64,
    /// Completed deliveries.
    pub completed: i64,
    /// Canceled or rejected assignments.
    pub canceled: i64,
    /// Mean minutes from assignment to completion, when any completed.
    pub average_delivery_minutes: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn assignment_transitions_follow_the_graph() {
        use AssignmentStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Accepted.can_transition_to(Completed));
        assert!(Accepted.can_transition_to(Canceled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Accepted.can_transition_to(Rejected));
        for terminal in [Rejected, Completed, Canceled] {
            for to in [Pending, Accepted, Rejected, Completed, Canceled] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn service_area_containment_uses_the_circle_radius() {
        let area = ServiceArea {
            id: Uuid::new_v4(),
            courier_id: Uuid::new_v4(),
            center_lat: 41.0,
            center_lng: 29.0,
            radius_km: 5.0,
            city: "Istanbul".to_string(),
            district: "Kadikoy".to_string(),
            is_active: true,
            created_at: Utc::now(),
        };

        let inside = Location::new(41.01, 29.01);
        let outside = Location::new(41.2, 29.2);
        assert!(in_service_area(&inside, std::slice::from_ref(&area)));
        assert!(!in_service_area(&outside, std::slice::from_ref(&area)));

        let mut disabled = area;
        disabled.is_active = false;
        assert!(!in_service_area(&inside, &[disabled]));
    }

    #[test]
    fn working_hours_match_day_and_window() {
        let window = WorkingHours {
            id: Uuid::new_v4(),
            courier_id: Uuid::new_v4(),
            day_of_week: 1, // Monday
            start_time: "09:00".to_string(),
            end_time: "18:00".to_string(),
        };

        // 2026-07-27 is a Monday.
        let monday_noon = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let monday_night = Utc.with_ymd_and_hms(2026, 7, 27, 22, 0, 0).unwrap();
        let tuesday_noon = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();

        assert!(is_working_at(std::slice::from_ref(&window), monday_noon));
        assert!(!is_working_at(std::slice::from_ref(&window), monday_night));
        assert!(!is_working_at(&[window], tuesday_noon));
    }

    #[test]
    fn dispatch_tag_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DispatchTag::NoCourier).unwrap(),
            "\"no_courier\""
        );
        assert_eq!(
            serde_json::to_string(&DispatchTag::RateLimited).unwrap(),
            "\"rate_limited\""
        );
    }

    #[test]
    fn snapshot_json_matches_the_cache_contract() {
        let snapshot = CourierLocationSnapshot {
            latitude: 41.0,
            longitude: 29.0,
            address: None,
            speed: Some(24.0),
            heading: None,
            accuracy: None,
            timestamp: Utc::now(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
        assert_eq!(json["latitude"], 41.0);
        assert_eq!(json["speed"], 24.0);
        assert!(json.get("heading").is_none());
    }
}
