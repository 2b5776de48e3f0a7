//! The courier registry: CRUD, availability queries, schedules and the
//! assignment lifecycle outside of dispatch.

use crate::cache::LocationCache;
use crate::error::{CourierError, Result};
use crate::stores::{AssignmentStore, CourierStore, ListPage, LocationStore};
use crate::types::{
    Assignment, AssignmentStatus, Courier, CourierAvailabilityRequest, CourierCandidate,
    CourierLocationUpdate, CourierPerformanceStats, CourierStatus, CreateCourierRequest,
    CreateServiceAreaRequest, CreateWorkingHoursRequest, ServiceArea, UpdateCourierRequest,
    WorkingHours,
};
use chrono::Utc;
use pazar_core::events::VehicleType;
use pazar_core::Location;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Registry-side parameters (shared with dispatch where they overlap).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Default search radius for availability queries, kilometers.
    pub max_distance_km: f64,
    /// Location samples older than this make a courier ineligible.
    pub freshness_window: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_distance_km: 10.0,
            freshness_window: Duration::from_secs(300),
        }
    }
}

/// Courier registry facade.
pub struct CourierService {
    couriers: Arc<dyn CourierStore>,
    assignments: Arc<dyn AssignmentStore>,
    locations: Arc<dyn LocationStore>,
    cache: Arc<dyn LocationCache>,
    config: RegistryConfig,
}

impl CourierService {
    /// Wire the registry from its stores.
    pub fn new(
        couriers: Arc<dyn CourierStore>,
        assignments: Arc<dyn AssignmentStore>,
        locations: Arc<dyn LocationStore>,
        cache: Arc<dyn LocationCache>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            couriers,
            assignments,
            locations,
            cache,
            config,
        }
    }

    // ========================================================================
    // Courier CRUD
    // ========================================================================

    /// Register a courier. New couriers start inactive and offline with a
    /// 5.0 rating.
    pub async fn create_courier(&self, req: CreateCourierRequest) -> Result<Courier> {
        if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
            return Err(CourierError::Validation("name fields are required".into()));
        }
        if !req.email.contains('@') {
            return Err(CourierError::Validation("email is not valid".into()));
        }

        let now = Utc::now();
        let courier = Courier {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
            email: req.email,
            vehicle_type: req.vehicle_type,
            vehicle_plate: req.vehicle_plate,
            status: CourierStatus::Inactive,
            rating: Decimal::new(50, 1), // 5.0
            completed_orders: 0,
            is_online: false,
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        };

        self.couriers.create(&courier).await?;
        info!(courier_id = %courier.id, "Courier registered");
        Ok(courier)
    }

    /// Fetch a courier.
    pub async fn get_courier(&self, id: Uuid) -> Result<Courier> {
        self.couriers
            .get(id)
            .await?
            .ok_or(CourierError::NotFound("Courier"))
    }

    /// Apply a partial update to a courier.
    pub async fn update_courier(&self, id: Uuid, req: UpdateCourierRequest) -> Result<()> {
        self.couriers.update(id, req).await
    }

    /// Remove a courier.
    pub async fn delete_courier(&self, id: Uuid) -> Result<()> {
        self.couriers.delete(id).await
    }

    /// List couriers with optional status and vehicle filters.
    pub async fn list_couriers(
        &self,
        status: Option<CourierStatus>,
        vehicle: Option<VehicleType>,
        page: ListPage,
    ) -> Result<(Vec<Courier>, i64)> {
        self.couriers.list(status, vehicle, page).await
    }

    /// Set a courier's availability status.
    pub async fn set_status(&self, id: Uuid, status: CourierStatus) -> Result<()> {
        self.couriers.set_status(id, status).await
    }

    /// Flip a courier's online flag.
    pub async fn set_online(&self, id: Uuid, online: bool) -> Result<()> {
        self.couriers.set_online(id, online).await
    }

    /// Ranked dispatch candidates around a point.
    pub async fn find_available(
        &self,
        req: CourierAvailabilityRequest,
    ) -> Result<Vec<CourierCandidate>> {
        let max_distance = req.max_distance_km.unwrap_or(self.config.max_distance_km);
        self.couriers
            .find_available(
                &req.location,
                max_distance,
                req.vehicle_type,
                self.config.freshness_window,
            )
            .await
    }

    /// Aggregate delivery statistics for a courier.
    pub async fn performance(&self, id: Uuid) -> Result<CourierPerformanceStats> {
        // Surface 404 for unknown couriers rather than a row of zeros.
        self.get_courier(id).await?;
        self.couriers.performance_stats(id).await
    }

    // ========================================================================
    // Service areas and schedules
    // ========================================================================

    /// Add a service area to a courier.
    pub async fn add_service_area(
        &self,
        courier_id: Uuid,
        req: CreateServiceAreaRequest,
    ) -> Result<ServiceArea> {
        if req.radius_km <= 0.0 {
            return Err(CourierError::Validation("radius must be positive".into()));
        }
        self.get_courier(courier_id).await?;

        let area = ServiceArea {
            id: Uuid::new_v4(),
            courier_id,
            center_lat: req.center_lat,
            center_lng: req.center_lng,
            radius_km: req.radius_km,
            city: req.city,
            district: req.district,
            is_active: true,
            created_at: Utc::now(),
        };
        self.couriers.add_service_area(&area).await?;
        Ok(area)
    }

    /// The courier's service areas.
    pub async fn service_areas(&self, courier_id: Uuid) -> Result<Vec<ServiceArea>> {
        self.couriers.service_areas(courier_id).await
    }

    /// Add a weekly working-hours window to a courier.
    pub async fn add_working_hours(
        &self,
        courier_id: Uuid,
        req: CreateWorkingHoursRequest,
    ) -> Result<WorkingHours> {
        if !(0..=6).contains(&req.day_of_week) {
            return Err(CourierError::Validation("day_of_week must be 0..=6".into()));
        }
        if !is_hh_mm(&req.start_time) || !is_hh_mm(&req.end_time) {
            return Err(CourierError::Validation("times must be HH:MM".into()));
        }
        self.get_courier(courier_id).await?;

        let hours = WorkingHours {
            id: Uuid::new_v4(),
            courier_id,
            day_of_week: req.day_of_week,
            start_time: req.start_time,
            end_time: req.end_time,
        };
        self.couriers.add_working_hours(&hours).await?;
        Ok(hours)
    }

    /// The courier's weekly working-hours windows.
    pub async fn working_hours(&self, courier_id: Uuid) -> Result<Vec<WorkingHours>> {
        self.couriers.working_hours(courier_id).await
    }

    // ========================================================================
    // Assignment lifecycle
    // ========================================================================

    /// Fetch an assignment.
    pub async fn get_assignment(&self, id: Uuid) -> Result<Assignment> {
        self.assignments
            .get(id)
            .await?
            .ok_or(CourierError::NotFound("Assignment"))
    }

    /// Move an assignment through its lifecycle, keeping the courier's
    /// status and the active-order cache in step:
    ///
    /// - `ACCEPTED` records the courier's active order (live tracking keys
    ///   off it)
    /// - `COMPLETED` bumps the courier's completed count and frees them
    /// - `REJECTED` / `CANCELED` free the courier
    pub async fn update_assignment_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        notes: Option<String>,
    ) -> Result<Assignment> {
        let assignment = self.assignments.update_status(id, status, notes).await?;

        match status {
            AssignmentStatus::Accepted => {
                if let Err(err) = self
                    .cache
                    .set_active_order(assignment.courier_id, assignment.order_id)
                    .await
                {
                    warn!(
                        assignment_id = %id,
                        error = %err,
                        "Failed to record active order in cache"
                    );
                }
            }
            AssignmentStatus::Completed => {
                self.couriers
                    .increment_completed(assignment.courier_id)
                    .await?;
                self.couriers
                    .set_status(assignment.courier_id, CourierStatus::Active)
                    .await?;
                if let Err(err) = self.cache.clear_active_order(assignment.courier_id).await {
                    warn!(assignment_id = %id, error = %err, "Failed to clear active order");
                }
            }
            AssignmentStatus::Rejected | AssignmentStatus::Canceled => {
                self.couriers
                    .set_status(assignment.courier_id, CourierStatus::Active)
                    .await?;
                if let Err(err) = self.cache.clear_active_order(assignment.courier_id).await {
                    warn!(assignment_id = %id, error = %err, "Failed to clear active order");
                }
            }
            AssignmentStatus::Pending => {}
        }

        info!(assignment_id = %id, status = %status, "Assignment status updated");
        Ok(assignment)
    }

    // ========================================================================
    // Location read path
    // ========================================================================

    /// The courier's current location: the cache when fresh, else the
    /// latest history row.
    pub async fn current_location(&self, courier_id: Uuid) -> Result<Location> {
        if let Some(snapshot) = self.cache.get_location(courier_id).await? {
            return Ok(snapshot.location());
        }

        self.locations
            .latest(courier_id)
            .await?
            .map(|update| update.location)
            .ok_or(CourierError::NotFound("Courier location"))
    }

    /// Recent location samples, newest first.
    pub async fn location_history(
        &self,
        courier_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CourierLocationUpdate>> {
        self.locations.history(courier_id, limit.clamp(1, 500)).await
    }
}

fn is_hh_mm(value: &str) -> bool {
    let Some((hours, minutes)) = value.split_once(':') else {
        return false;
    };
    let (Ok(h), Ok(m)) = (hours.parse::<u8>(), minutes.parse::<u8>()) else {
        return false;
    };
    hours.len() == 2 && minutes.len() == 2 && h < 24 && m < 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryLocationCache;
    use crate::stores::{InMemoryAssignmentStore, InMemoryCourierStore};
    use crate::types::AssignOrderRequest;
    use crate::dispatch::{DispatchConfig, Dispatcher};
    use crate::types::CourierLocationSnapshot;
    use rust_decimal_macros::dec;

    struct Fixture {
        service: CourierService,
        couriers: InMemoryCourierStore,
        cache: InMemoryLocationCache,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let couriers = InMemoryCourierStore::new();
        let assignments = InMemoryAssignmentStore::new(couriers.clone());
        let cache = InMemoryLocationCache::new();
        let service = CourierService::new(
            Arc::new(couriers.clone()),
            Arc::new(assignments.clone()),
            Arc::new(couriers.clone()),
            Arc::new(cache.clone()),
            RegistryConfig::default(),
        );
        let dispatcher = Dispatcher::new(
            Arc::new(couriers.clone()),
            Arc::new(assignments.clone()),
            Arc::new(cache.clone()),
            DispatchConfig::default(),
        );
        Fixture {
            service,
            couriers,
            cache,
            dispatcher,
        }
    }

    fn create_request() -> CreateCourierRequest {
        CreateCourierRequest {
            user_id: Uuid::new_v4(),
            first_name: "Aylin".to_string(),
            last_name: "Demir".to_string(),
            phone: "+905551112233".to_string(),
            email: "aylin@example.com".to_string(),
            vehicle_type: VehicleType::Motorbike,
            vehicle_plate: Some("34 ABC 123".to_string()),
        }
    }

    #[tokio::test]
    async fn new_couriers_start_inactive_and_offline() {
        let fixture = fixture();
        let courier = fixture.service.create_courier(create_request()).await.unwrap();

        assert_eq!(courier.status, CourierStatus::Inactive);
        assert!(!courier.is_online);
        assert_eq!(courier.rating, dec!(5.0));
        assert_eq!(courier.completed_orders, 0);
    }

    #[tokio::test]
    async fn invalid_registration_is_rejected() {
        let fixture = fixture();
        let mut req = create_request();
        req.email = "not-an-email".to_string();
        assert!(matches!(
            fixture.service.create_courier(req).await.unwrap_err(),
            CourierError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn going_online_stamps_last_seen() {
        let fixture = fixture();
        let courier = fixture.service.create_courier(create_request()).await.unwrap();

        fixture.service.set_online(courier.id, true).await.unwrap();
        let updated = fixture.service.get_courier(courier.id).await.unwrap();
        assert!(updated.is_online);
        assert!(updated.last_seen_at.is_some());
    }

    async fn dispatched_assignment(fixture: &Fixture) -> Assignment {
        let courier = fixture.service.create_courier(create_request()).await.unwrap();
        fixture
            .service
            .set_status(courier.id, CourierStatus::Active)
            .await
            .unwrap();
        fixture.service.set_online(courier.id, true).await.unwrap();
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
        let response = fixture
            .dispatcher
            .assign_order(AssignOrderRequest {
                order_id: Uuid::new_v4(),
                pickup_location: Location::new(41.0, 29.0),
                delivery_location: Location::new(41.05, 29.05),
                priority: 1,
                required_vehicle: None,
                max_distance_km: None,
                notes: None,
            })
            .await
            .unwrap();
        response.assignment.expect("assignment created")
    }

    #[tokio::test]
    async fn accepting_an_assignment_records_the_active_order() {
        let fixture = fixture();
        let assignment = dispatched_assignment(&fixture).await;

        fixture
            .service
            .update_assignment_status(assignment.id, AssignmentStatus::Accepted, None)
            .await
            .unwrap();

        assert_eq!(
            fixture.cache.active_order(assignment.courier_id).await.unwrap(),
            Some(assignment.order_id)
        );
    }

    #[tokio::test]
    async fn completing_frees_the_courier_and_counts_the_delivery() {
        let fixture = fixture();
        let assignment = dispatched_assignment(&fixture).await;

        fixture
            .service
            .update_assignment_status(assignment.id, AssignmentStatus::Accepted, None)
            .await
            .unwrap();
        fixture
            .service
            .update_assignment_status(assignment.id, AssignmentStatus::Completed, None)
            .await
            .unwrap();

        let courier = fixture.service.get_courier(assignment.courier_id).await.unwrap();
        assert_eq!(courier.status, CourierStatus::Active);
        assert_eq!(courier.completed_orders, 1);
        assert_eq!(
            fixture.cache.active_order(assignment.courier_id).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn rejecting_frees_the_courier_without_counting() {
        let fixture = fixture();
        let assignment = dispatched_assignment(&fixture).await;

        fixture
            .service
            .update_assignment_status(assignment.id, AssignmentStatus::Rejected, None)
            .await
            .unwrap();

        let courier = fixture.service.get_courier(assignment.courier_id).await.unwrap();
        assert_eq!(courier.status, CourierStatus::Active);
        assert_eq!(courier.completed_orders, 0);
    }

    #[tokio::test]
    async fn assignment_cannot_skip_to_completed() {
        let fixture = fixture();
        let assignment = dispatched_assignment(&fixture).await;

        let err = fixture
            .service
            .update_assignment_status(assignment.id, AssignmentStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CourierError::InvalidAssignmentTransition { .. }
        ));
    }

    #[tokio::test]
    async fn working_hours_validation() {
        let fixture = fixture();
        let courier = fixture.service.create_courier(create_request()).await.unwrap();

        let bad_day = CreateWorkingHoursRequest {
            day_of_week: 7,
            start_time: "09:00".to_string(),
            end_time: "18:00".to_string(),
        };
        assert!(fixture
            .service
            .add_working_hours(courier.id, bad_day)
            .await
            .is_err());

        let bad_time = CreateWorkingHoursRequest {
            day_of_week: 1,
            start_time: "9am".to_string(),
            end_time: "18:00".to_string(),
        };
        assert!(fixture
            .service
            .add_working_hours(courier.id, bad_time)
            .await
            .is_err());

        let good = CreateWorkingHoursRequest {
            day_of_week: 1,
            start_time: "09:00".to_string(),
            end_time: "18:00".to_string(),
        };
        let window = fixture
            .service
            .add_working_hours(courier.id, good)
            .await
            .unwrap();
        assert_eq!(window.day_of_week, 1);
    }

    #[tokio::test]
    async fn current_location_prefers_the_cache() {
        let fixture = fixture();
        let courier = fixture.service.create_courier(create_request()).await.unwrap();

        // History says Kadikoy, cache says Besiktas; the cache wins.
        use crate::stores::LocationStore as _;
        fixture
            .couriers
            .append(&CourierLocationUpdate {
                courier_id: courier.id,
                location: Location::new(40.99, 29.02),
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
                    latitude: 41.04,
                    longitude: 29.00,
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

        let location = fixture.service.current_location(courier.id).await.unwrap();
        assert_eq!(location.latitude, 41.04);
    }

    #[tokio::test]
    async fn current_location_falls_back_to_history() {
        let fixture = fixture();
        let courier = fixture.service.create_courier(create_request()).await.unwrap();

        use crate::stores::LocationStore as _;
        fixture
            .couriers
            .append(&CourierLocationUpdate {
                courier_id: courier.id,
                location: Location::new(40.99, 29.02),
                speed: None,
                heading: None,
                accuracy: None,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let location = fixture.service.current_location(courier.id).await.unwrap();
        assert_eq!(location.latitude, 40.99);

        let missing = fixture.service.current_location(Uuid::new_v4()).await;
        assert_eq!(missing.unwrap_err(), CourierError::NotFound("Courier location"));
    }
}
