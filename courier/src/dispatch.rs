//! The courier dispatch engine.
//!
//! One public operation: take a paid order and pick a courier for it, under
//! admission control and a hard deadline. Two strategies run in order:
//!
//! 1. **Proximity**: rank fresh, active, online couriers near the pickup
//!    point by distance (ties within 100 m collapse), then rating, then
//!    completed orders; the first candidate passing service-area and
//!    working-hours checks wins.
//! 2. **Round-robin**: when proximity finds nobody, rotate a cursor over
//!    all active online couriers (serialized by a mutex), skipping couriers
//!    without a fresh cached location, with bounded retries.
//!
//! Selection writes the assignment, flips the courier to `BUSY` and records
//! the `courier.assigned` outbox event in one transaction, so a crash can
//! never leave a courier busy without an assignment or an assignment
//! without its event.
//!
//! # Admission Control
//!
//! Every call must win a semaphore permit (bounding in-flight assignments)
//! and a token-bucket token (bounding assignment rate), both within the
//! assignment deadline. Refusals are *unsuccessful responses* tagged
//! `overloaded` / `rate_limited`, not errors; the caller may retry.

use crate::error::{CourierError, Result};
use crate::eta;
use crate::limiter::TokenBucket;
use crate::stores::{AssignmentStore, CourierStore, ListPage};
use crate::types::{
    in_service_area, is_working_at, Assignment, AssignmentResponse, AssignmentStatus,
    AssignOrderRequest, Courier, CourierCandidate, CourierStatus, DispatchTag,
    ManualAssignRequest,
};
use crate::cache::LocationCache;
use chrono::Utc;
use pazar_core::events::{topics, AssignmentMethod, CourierAssignedEvent};
use pazar_outbox::OutboxEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Distances closer than this collapse into one bucket when ranking, so a
/// 40 m difference never beats a better rating.
const DISTANCE_TIE_KM: f64 = 0.1;

/// Dispatch engine parameters.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Hard deadline for one dispatch call, admission waits included.
    pub assignment_timeout: Duration,
    /// Default search radius around the pickup point, kilometers.
    pub max_distance_km: f64,
    /// Maximum in-flight dispatch calls (semaphore size).
    pub max_concurrent_assignments: usize,
    /// Token bucket refill rate, assignments per second.
    pub rate_per_sec: f64,
    /// Token bucket burst size.
    pub rate_burst: f64,
    /// Location samples older than this make a courier ineligible.
    pub freshness_window: Duration,
    /// How many couriers the round-robin fallback will try before giving
    /// up on stale locations.
    pub round_robin_retries: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            assignment_timeout: Duration::from_secs(1),
            max_distance_km: 10.0,
            max_concurrent_assignments: 100,
            rate_per_sec: 100.0,
            rate_burst: 100.0,
            freshness_window: Duration::from_secs(300),
            round_robin_retries: 3,
        }
    }
}

/// Rank dispatch candidates: distance buckets first, then rating, then
/// completed orders.
fn rank_candidates(mut candidates: Vec<CourierCandidate>) -> Vec<CourierCandidate> {
    candidates.sort_by(|a, b| {
        if (a.distance_km - b.distance_km).abs() > DISTANCE_TIE_KM {
            a.distance_km.total_cmp(&b.distance_km)
        } else {
            b.courier
                .rating
                .cmp(&a.courier.rating)
                .then(b.courier.completed_orders.cmp(&a.courier.completed_orders))
        }
    });
    candidates
}

/// The dispatch engine.
pub struct Dispatcher {
    couriers: Arc<dyn CourierStore>,
    assignments: Arc<dyn AssignmentStore>,
    cache: Arc<dyn LocationCache>,
    semaphore: Semaphore,
    rate_limiter: TokenBucket,
    round_robin_cursor: Mutex<usize>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Wire the engine from its stores and parameters. The admission
    /// primitives live for the process lifetime.
    pub fn new(
        couriers: Arc<dyn CourierStore>,
        assignments: Arc<dyn AssignmentStore>,
        cache: Arc<dyn LocationCache>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            couriers,
            assignments,
            cache,
            semaphore: Semaphore::new(config.max_concurrent_assignments),
            rate_limiter: TokenBucket::new(config.rate_per_sec, config.rate_burst),
            round_robin_cursor: Mutex::new(0),
            config,
        }
    }

    /// Assign a courier to a paid order.
    ///
    /// Admission refusals and empty candidate pools return unsuccessful
    /// responses; errors are reserved for conflicts (order already
    /// assigned) and infrastructure failures.
    pub async fn assign_order(&self, req: AssignOrderRequest) -> Result<AssignmentResponse> {
        let started = Instant::now();
        let deadline = started + self.config.assignment_timeout;

        let _permit = match tokio::time::timeout_at(deadline, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                warn!(order_id = %req.order_id, "Dispatcher overloaded, refusing assignment");
                return Ok(refusal(
                    DispatchTag::Overloaded,
                    "Assignment service overloaded",
                    started,
                ));
            }
        };

        if !self.rate_limiter.acquire_until(deadline).await {
            warn!(order_id = %req.order_id, "Assignment rate limit exceeded");
            return Ok(refusal(DispatchTag::RateLimited, "Rate limit exceeded", started));
        }

        debug!(order_id = %req.order_id, "Starting assignment");

        match self.try_proximity(&req, started).await {
            Ok(Some(response)) => return Ok(response),
            Ok(None) => debug!(order_id = %req.order_id, "No proximity candidate"),
            Err(CourierError::AlreadyAssigned) => return Err(CourierError::AlreadyAssigned),
            Err(err) => {
                warn!(order_id = %req.order_id, error = %err, "Proximity strategy failed");
            }
        }

        match self.try_round_robin(&req, started).await {
            Ok(Some(response)) => return Ok(response),
            Ok(None) => debug!(order_id = %req.order_id, "Round-robin found no courier"),
            Err(CourierError::AlreadyAssigned) => return Err(CourierError::AlreadyAssigned),
            Err(err) => {
                warn!(order_id = %req.order_id, error = %err, "Round-robin strategy failed");
            }
        }

        Ok(refusal(
            DispatchTag::NoCourier,
            "No available couriers found",
            started,
        ))
    }

    /// Admin override: assign a specific courier, bypassing the strategies
    /// and admission control.
    ///
    /// Requires the courier to exist and the order to have no live
    /// assignment.
    pub async fn manual_assign(&self, req: ManualAssignRequest) -> Result<AssignmentResponse> {
        let started = Instant::now();

        if req.reason.trim().is_empty() {
            return Err(CourierError::Validation(
                "manual assignment requires a reason".into(),
            ));
        }

        let courier = self
            .couriers
            .get(req.courier_id)
            .await?
            .ok_or(CourierError::NotFound("Courier"))?;

        if self.assignments.active_for_order(req.order_id).await?.is_some() {
            return Err(CourierError::AlreadyAssigned);
        }

        // Distance from the courier's cached location when we have one; an
        // offline courier still gets the assignment the admin asked for.
        let distance_km = match self.cache.get_location(courier.id).await? {
            Some(snapshot) => snapshot.location().distance_km(&req.pickup_location),
            None => 0.0,
        };

        let assign_req = AssignOrderRequest {
            order_id: req.order_id,
            pickup_location: req.pickup_location,
            delivery_location: req.delivery_location,
            priority: 1,
            required_vehicle: None,
            max_distance_km: None,
            notes: Some(req.reason),
        };

        self.finalize(&assign_req, &courier, distance_km, AssignmentMethod::Manual, started)
            .await
    }

    async fn try_proximity(
        &self,
        req: &AssignOrderRequest,
        started: Instant,
    ) -> Result<Option<AssignmentResponse>> {
        let max_distance = req
            .max_distance_km
            .filter(|d| *d < self.config.max_distance_km)
            .unwrap_or(self.config.max_distance_km);

        let candidates = self
            .couriers
            .find_available(
                &req.pickup_location,
                max_distance,
                req.required_vehicle,
                self.config.freshness_window,
            )
            .await?;

        for candidate in rank_candidates(candidates) {
            let courier_id = candidate.courier.id;

            let areas = self.couriers.service_areas(courier_id).await?;
            if !areas.is_empty() && !in_service_area(&req.pickup_location, &areas) {
                debug!(courier_id = %courier_id, "Pickup outside courier service areas");
                continue;
            }

            let hours = self.couriers.working_hours(courier_id).await?;
            if !hours.is_empty() && !is_working_at(&hours, Utc::now()) {
                debug!(courier_id = %courier_id, "Courier outside working hours");
                continue;
            }

            return self
                .finalize(
                    req,
                    &candidate.courier,
                    candidate.distance_km,
                    AssignmentMethod::Proximity,
                    started,
                )
                .await
                .map(Some);
        }

        Ok(None)
    }

    async fn try_round_robin(
        &self,
        req: &AssignOrderRequest,
        started: Instant,
    ) -> Result<Option<AssignmentResponse>> {
        // The cursor lock serializes the whole fallback so concurrent calls
        // cannot pick the same index.
        let mut cursor = self.round_robin_cursor.lock().await;

        let (couriers, _) = self
            .couriers
            .list(
                Some(CourierStatus::Active),
                req.required_vehicle,
                ListPage { page: 1, limit: 100 },
            )
            .await?;
        let online: Vec<Courier> = couriers.into_iter().filter(|c| c.is_online).collect();

        if online.is_empty() {
            return Ok(None);
        }

        let attempts = online.len().min(self.config.round_robin_retries.max(1));
        for _ in 0..attempts {
            let index = *cursor % online.len();
            *cursor = cursor.wrapping_add(1);
            let courier = &online[index];

            // A courier without a fresh cached location cannot be routed to
            // a pickup; advance the rotation instead of failing the call.
            let Some(snapshot) = self.cache.get_location(courier.id).await? else {
                debug!(courier_id = %courier.id, "No fresh location, advancing rotation");
                continue;
            };

            let areas = self.couriers.service_areas(courier.id).await?;
            if !areas.is_empty() && !in_service_area(&req.pickup_location, &areas) {
                debug!(courier_id = %courier.id, "Pickup outside courier service areas");
                continue;
            }
            let hours = self.couriers.working_hours(courier.id).await?;
            if !hours.is_empty() && !is_working_at(&hours, Utc::now()) {
                debug!(courier_id = %courier.id, "Courier outside working hours");
                continue;
            }

            let distance_km = snapshot.location().distance_km(&req.pickup_location);
            let response = self
                .finalize(req, courier, distance_km, AssignmentMethod::RoundRobin, started)
                .await?;
            return Ok(Some(response));
        }

        Ok(None)
    }

    /// Create the assignment, flip the courier, record the event, build the
    /// response. One store call, one transaction.
    async fn finalize(
        &self,
        req: &AssignOrderRequest,
        courier: &Courier,
        distance_km: f64,
        method: AssignmentMethod,
        started: Instant,
    ) -> Result<AssignmentResponse> {
        let eta_minutes = eta::calculate_eta_minutes(distance_km, courier.vehicle_type);
        let now = Utc::now();

        let assignment = Assignment {
            id: Uuid::new_v4(),
            order_id: req.order_id,
            courier_id: courier.id,
            status: AssignmentStatus::Pending,
            pickup_location: req.pickup_location.clone(),
            delivery_location: req.delivery_location.clone(),
            estimated_distance_km: distance_km,
            estimated_duration_min: eta_minutes,
            actual_distance_km: None,
            actual_duration_min: None,
            accepted_at: None,
            rejected_at: None,
            completed_at: None,
            notes: req.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        let payload = CourierAssignedEvent {
            assignment_id: assignment.id,
            order_id: req.order_id,
            courier_id: courier.id,
            estimated_eta_minutes: eta_minutes,
            assignment_method: method,
            distance_km,
            timestamp: now,
        };
        let event = OutboxEvent::new(req.order_id, topics::COURIER_ASSIGNED, &payload)?;

        self.assignments.create(&assignment, &event).await?;

        info!(
            order_id = %req.order_id,
            courier_id = %courier.id,
            method = %method,
            distance_km = distance_km,
            eta_minutes = eta_minutes,
            "Courier assigned"
        );

        Ok(AssignmentResponse {
            success: true,
            message: "Courier assigned successfully".to_string(),
            assignment: Some(assignment),
            estimated_eta_minutes: Some(eta_minutes),
            method: method.into(),
            processing_ms: started.elapsed().as_millis() as i64,
        })
    }
}

fn refusal(tag: DispatchTag, message: &str, started: Instant) -> AssignmentResponse {
    AssignmentResponse {
        success: false,
        message: message.to_string(),
        assignment: None,
        estimated_eta_minutes: None,
        method: tag,
        processing_ms: started.elapsed().as_millis() as i64,
    }
}
