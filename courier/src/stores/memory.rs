//! In-memory store implementations for tests and local development.
//!
//! [`InMemoryCourierStore`] also implements [`LocationStore`], since the
//! availability query needs both courier rows and fresh locations; one
//! struct keeps them consistent the way the database join does.

use crate::error::{CourierError, Result};
use crate::stores::{
    apply_assignment_transition, AssignmentStore, CourierStore, ListPage, LocationStore,
};
use crate::types::{
    Assignment, AssignmentStatus, Courier, CourierCandidate, CourierLocationUpdate,
    CourierPerformanceStats, CourierStatus, ServiceArea, UpdateCourierRequest, WorkingHours,
};
use async_trait::async_trait;
use chrono::Utc;
use pazar_core::events::VehicleType;
use pazar_core::Location;
use pazar_outbox::{InMemoryOutboxStore, OutboxEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// In-memory courier registry plus location history.
#[derive(Clone, Default)]
pub struct InMemoryCourierStore {
    couriers: Arc<Mutex<HashMap<Uuid, Courier>>>,
    locations: Arc<Mutex<HashMap<Uuid, Vec<CourierLocationUpdate>>>>,
    areas: Arc<Mutex<Vec<ServiceArea>>>,
    hours: Arc<Mutex<Vec<WorkingHours>>>,
}

impl InMemoryCourierStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourierStore for InMemoryCourierStore {
    async fn create(&self, courier: &Courier) -> Result<()> {
        self.couriers
            .lock()
            .expect("lock poisoned")
            .insert(courier.id, courier.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Courier>> {
        Ok(self.couriers.lock().expect("lock poisoned").get(&id).cloned())
    }

    async fn update(&self, id: Uuid, req: UpdateCourierRequest) -> Result<()> {
        let mut couriers = self.couriers.lock().expect("lock poisoned");
        let courier = couriers.get_mut(&id).ok_or(CourierError::NotFound("Courier"))?;

        if let Some(v) = req.first_name {
            courier.first_name = v;
        }
        if let Some(v) = req.last_name {
            courier.last_name = v;
        }
        if let Some(v) = req.phone {
            courier.phone = v;
        }
        if let Some(v) = req.email {
            courier.email = v;
        }
        if let Some(v) = req.vehicle_type {
            courier.vehicle_type = v;
        }
        if let Some(v) = req.vehicle_plate {
            courier.vehicle_plate = Some(v);
        }
        courier.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.couriers
            .lock()
            .expect("lock poisoned")
            .remove(&id)
            .map(|_| ())
            .ok_or(CourierError::NotFound("Courier"))
    }

    async fn list(
        &self,
        status: Option<CourierStatus>,
        vehicle: Option<VehicleType>,
        page: ListPage,
    ) -> Result<(Vec<Courier>, i64)> {
        let couriers = self.couriers.lock().expect("lock poisoned");
        let mut matching: Vec<Courier> = couriers
            .values()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .filter(|c| vehicle.is_none_or(|v| c.vehicle_type == v))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = matching.len() as i64;
        let page_items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok((page_items, total))
    }

    async fn find_available(
        &self,
        pickup: &Location,
        max_distance_km: f64,
        vehicle: Option<VehicleType>,
        freshness: Duration,
    ) -> Result<Vec<CourierCandidate>> {
        let couriers = self.couriers.lock().expect("lock poisoned");
        let locations = self.locations.lock().expect("lock poisoned");
        let oldest_acceptable =
            Utc::now() - chrono::Duration::from_std(freshness).unwrap_or_else(|_| chrono::Duration::zero());

        let mut candidates: Vec<CourierCandidate> = couriers
            .values()
            .filter(|c| c.is_available_for_assignment())
            .filter(|c| vehicle.is_none_or(|v| c.vehicle_type == v))
            .filter_map(|c| {
                let latest = locations.get(&c.id)?.last()?;
                if latest.timestamp <= oldest_acceptable {
                    return None;
                }
                let distance_km = latest.location.distance_km(pickup);
                (distance_km <= max_distance_km).then(|| CourierCandidate {
                    courier: c.clone(),
                    location: latest.location.clone(),
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then(b.courier.rating.cmp(&a.courier.rating))
                .then(b.courier.completed_orders.cmp(&a.courier.completed_orders))
        });
        candidates.truncate(50);
        Ok(candidates)
    }

    async fn set_status(&self, id: Uuid, status: CourierStatus) -> Result<()> {
        let mut couriers = self.couriers.lock().expect("lock poisoned");
        let courier = couriers.get_mut(&id).ok_or(CourierError::NotFound("Courier"))?;
        courier.status = status;
        courier.updated_at = Utc::now();
        Ok(())
    }

    async fn set_online(&self, id: Uuid, online: bool) -> Result<()> {
        let mut couriers = self.couriers.lock().expect("lock poisoned");
        let courier = couriers.get_mut(&id).ok_or(CourierError::NotFound("Courier"))?;
        courier.is_online = online;
        if online {
            courier.last_seen_at = Some(Utc::now());
        }
        courier.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_completed(&self, id: Uuid) -> Result<()> {
        let mut couriers = self.couriers.lock().expect("lock poisoned");
        if let Some(courier) = couriers.get_mut(&id) {
            courier.completed_orders += 1;
        }
        Ok(())
    }

    async fn service_areas(&self, courier_id: Uuid) -> Result<Vec<ServiceArea>> {
        Ok(self
            .areas
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|a| a.courier_id == courier_id)
            .cloned()
            .collect())
    }

    async fn add_service_area(&self, area: &ServiceArea) -> Result<()> {
        self.areas.lock().expect("lock poisoned").push(area.clone());
        Ok(())
    }

    async fn working_hours(&self, courier_id: Uuid) -> Result<Vec<WorkingHours>> {
        Ok(self
            .hours
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|h| h.courier_id == courier_id)
            .cloned()
            .collect())
    }

    async fn add_working_hours(&self, hours: &WorkingHours) -> Result<()> {
        self.hours.lock().expect("lock poisoned").push(hours.clone());
        Ok(())
    }

    async fn performance_stats(&self, courier_id: Uuid) -> Result<CourierPerformanceStats> {
        // Stats come from the assignment store in production; the in-memory
        // registry reports zeros, which is enough for registry tests.
        Ok(CourierPerformanceStats {
            courier_id,
            total_assignments: 0,
            completed: 0,
            canceled: 0,
            average_delivery_minutes: None,
        })
    }
}

#[async_trait]
impl LocationStore for InMemoryCourierStore {
    async fn append(&self, update: &CourierLocationUpdate) -> Result<()> {
        self.locations
            .lock()
            .expect("lock poisoned")
            .entry(update.courier_id)
            .or_default()
            .push(update.clone());

        let mut couriers = self.couriers.lock().expect("lock poisoned");
        if let Some(courier) = couriers.get_mut(&update.courier_id) {
            courier.last_seen_at = Some(update.timestamp);
            courier.is_online = true;
        }
        Ok(())
    }

    async fn latest(&self, courier_id: Uuid) -> Result<Option<CourierLocationUpdate>> {
        Ok(self
            .locations
            .lock()
            .expect("lock poisoned")
            .get(&courier_id)
            .and_then(|v| v.last().cloned()))
    }

    async fn history(&self, courier_id: Uuid, limit: i64) -> Result<Vec<CourierLocationUpdate>> {
        Ok(self
            .locations
            .lock()
            .expect("lock poisoned")
            .get(&courier_id)
            .map(|v| v.iter().rev().take(limit.max(0) as usize).cloned().collect())
            .unwrap_or_default())
    }
}

/// In-memory assignment store.
///
/// Shares a courier store so creation can flip the courier to `BUSY`, and
/// an outbox log so tests can observe the `courier.assigned` event landing
/// with the assignment.
#[derive(Clone)]
pub struct InMemoryAssignmentStore {
    assignments: Arc<Mutex<HashMap<Uuid, Assignment>>>,
    couriers: InMemoryCourierStore,
    outbox: InMemoryOutboxStore,
}

impl InMemoryAssignmentStore {
    /// Create a store wired to the given courier registry.
    #[must_use]
    pub fn new(couriers: InMemoryCourierStore) -> Self {
        Self {
            assignments: Arc::new(Mutex::new(HashMap::new())),
            couriers,
            outbox: InMemoryOutboxStore::new(),
        }
    }

    /// An outbox store view over this store's event log.
    #[must_use]
    pub fn outbox_store(&self) -> InMemoryOutboxStore {
        self.outbox.clone()
    }

    /// All outbox rows, in insertion order.
    #[must_use]
    pub fn outbox_rows(&self) -> Vec<OutboxEvent> {
        self.outbox.rows()
    }
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn create(&self, assignment: &Assignment, event: &OutboxEvent) -> Result<()> {
        let mut assignments = self.assignments.lock().expect("lock poisoned");

        let live_exists = assignments
            .values()
            .any(|a| a.order_id == assignment.order_id && !a.status.is_terminal());
        if live_exists {
            return Err(CourierError::AlreadyAssigned);
        }

        assignments.insert(assignment.id, assignment.clone());
        drop(assignments);

        {
            let mut couriers = self.couriers.couriers.lock().expect("lock poisoned");
            if let Some(courier) = couriers.get_mut(&assignment.courier_id) {
                courier.status = CourierStatus::Busy;
            }
        }

        self.outbox.push(event.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Assignment>> {
        Ok(self
            .assignments
            .lock()
            .expect("lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn active_for_order(&self, order_id: Uuid) -> Result<Option<Assignment>> {
        Ok(self
            .assignments
            .lock()
            .expect("lock poisoned")
            .values()
            .find(|a| a.order_id == order_id && !a.status.is_terminal())
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        notes: Option<String>,
    ) -> Result<Assignment> {
        let mut assignments = self.assignments.lock().expect("lock poisoned");
        let assignment = assignments
            .get_mut(&id)
            .ok_or(CourierError::NotFound("Assignment"))?;

        apply_assignment_transition(assignment, status, notes)?;
        Ok(assignment.clone())
    }
}
