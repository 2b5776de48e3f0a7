//! Storage abstractions for the courier service.
//!
//! Traits with a PostgreSQL implementation for production and an in-memory
//! implementation for tests. Assignment creation is the critical one: the
//! PostgreSQL implementation inserts the assignment, flips the courier to
//! `BUSY` and writes the `courier.assigned` outbox row in one transaction,
//! with the partial unique index on `assignments(order_id)` turning a
//! concurrent double-dispatch into a clean conflict.

pub mod memory;
pub mod postgres;

use crate::error::{CourierError, Result};
use crate::types::{
    Assignment, AssignmentStatus, Courier, CourierCandidate, CourierLocationUpdate,
    CourierPerformanceStats, CourierStatus, ServiceArea, UpdateCourierRequest, WorkingHours,
};
use async_trait::async_trait;
use chrono::Utc;
use pazar_core::events::VehicleType;
use pazar_core::Location;
use pazar_outbox::OutboxEvent;
use std::time::Duration;
use uuid::Uuid;

pub use memory::{InMemoryAssignmentStore, InMemoryCourierStore};
pub use postgres::{PostgresAssignmentStore, PostgresCourierStore, PostgresLocationStore};

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

/// Mutate an assignment for a status change, enforcing the transition rules
/// and stamping the matching timestamp. Shared by every [`AssignmentStore`]
/// implementation.
pub(crate) fn apply_assignment_transition(
    assignment: &mut Assignment,
    to: AssignmentStatus,
    notes: Option<String>,
) -> Result<()> {
    let from = assignment.status;
    if !from.can_transition_to(to) {
        return Err(CourierError::InvalidAssignmentTransition { from, to });
    }

    let now = Utc::now();
    assignment.status = to;
    match to {
        AssignmentStatus::Accepted => assignment.accepted_at = Some(now),
        AssignmentStatus::Rejected => assignment.rejected_at = Some(now),
        AssignmentStatus::Completed => {
            assignment.completed_at = Some(now);
            assignment.actual_duration_min =
                Some(((now - assignment.created_at).num_seconds() / 60) as i32);
        }
        AssignmentStatus::Pending | AssignmentStatus::Canceled => {}
    }
    if let Some(notes) = notes {
        assignment.notes = Some(notes);
    }
    assignment.updated_at = now;
    Ok(())
}

/// Persistent storage for couriers, their service areas and schedules.
#[async_trait]
pub trait CourierStore: Send + Sync {
    /// Register a courier.
    async fn create(&self, courier: &Courier) -> Result<()>;

    /// Fetch a courier.
    async fn get(&self, id: Uuid) -> Result<Option<Courier>>;

    /// Apply a partial update.
    async fn update(&self, id: Uuid, req: UpdateCourierRequest) -> Result<()>;

    /// Remove a courier.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Couriers filtered by status and vehicle, with the total count.
    async fn list(
        &self,
        status: Option<CourierStatus>,
        vehicle: Option<VehicleType>,
        page: ListPage,
    ) -> Result<(Vec<Courier>, i64)>;

    /// Dispatch candidates near a pickup point: `ACTIVE`, online, with a
    /// location fresher than `freshness` and within `max_distance_km`,
    /// matching `vehicle` when given. Sorted by distance, then rating, then
    /// completed orders; capped at 50.
    async fn find_available(
        &self,
        pickup: &Location,
        max_distance_km: f64,
        vehicle: Option<VehicleType>,
        freshness: Duration,
    ) -> Result<Vec<CourierCandidate>>;

    /// Set the availability status.
    async fn set_status(&self, id: Uuid, status: CourierStatus) -> Result<()>;

    /// Set the online flag; going online also bumps `last_seen_at`.
    async fn set_online(&self, id: Uuid, online: bool) -> Result<()>;

    /// Bump the lifetime completed-orders counter.
    async fn increment_completed(&self, id: Uuid) -> Result<()>;

    /// The courier's service areas.
    async fn service_areas(&self, courier_id: Uuid) -> Result<Vec<ServiceArea>>;

    /// Add a service area.
    async fn add_service_area(&self, area: &ServiceArea) -> Result<()>;

    /// The courier's weekly working-hour windows.
    async fn working_hours(&self, courier_id: Uuid) -> Result<Vec<WorkingHours>>;

    /// Add a working-hours window.
    async fn add_working_hours(&self, hours: &WorkingHours) -> Result<()>;

    /// Aggregate delivery statistics from the assignments table.
    async fn performance_stats(&self, courier_id: Uuid) -> Result<CourierPerformanceStats>;
}

/// Persistent storage for assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Create an assignment, flip its courier to `BUSY` and write the
    /// dispatch outbox event, atomically.
    ///
    /// Fails with [`CourierError::AlreadyAssigned`] when the order already
    /// has a live assignment (partial unique index).
    async fn create(&self, assignment: &Assignment, event: &OutboxEvent) -> Result<()>;

    /// Fetch an assignment.
    async fn get(&self, id: Uuid) -> Result<Option<Assignment>>;

    /// The order's live (`PENDING` or `ACCEPTED`) assignment, if any.
    async fn active_for_order(&self, order_id: Uuid) -> Result<Option<Assignment>>;

    /// Move an assignment to a new status, enforcing the transition rules.
    async fn update_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        notes: Option<String>,
    ) -> Result<Assignment>;
}

/// Append-only location history.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Append a sample; also bumps the courier's `last_seen_at` and marks
    /// them online.
    async fn append(&self, update: &CourierLocationUpdate) -> Result<()>;

    /// The courier's most recent sample.
    async fn latest(&self, courier_id: Uuid) -> Result<Option<CourierLocationUpdate>>;

    /// The courier's most recent samples, newest first.
    async fn history(&self, courier_id: Uuid, limit: i64) -> Result<Vec<CourierLocationUpdate>>;
}
