//! PostgreSQL implementations of the courier-service stores.

use crate::error::{CourierError, Result};
use crate::stores::{
    apply_assignment_transition, AssignmentStore, CourierStore, ListPage, LocationStore,
};
use crate::types::{
    Assignment, AssignmentStatus, Courier, CourierCandidate, CourierLocationUpdate,
    CourierPerformanceStats, CourierStatus, ServiceArea, UpdateCourierRequest, WorkingHours,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pazar_core::events::VehicleType;
use pazar_core::Location;
use pazar_outbox::OutboxEvent;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

/// Apply the service schema. Idempotent.
///
/// # Errors
///
/// Returns [`CourierError::Database`] if the migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| CourierError::database("Migration failed", e))
}

// ============================================================================
// Row types
// ============================================================================

const COURIER_COLUMNS: &str = "id, user_id, first_name, last_name, phone, email, vehicle_type, \
     vehicle_plate, status, rating, completed_orders, is_online, last_seen_at, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CourierRow {
    id: Uuid,
    user_id: Uuid,
    first_name: String,
    last_name: String,
    phone: String,
    email: String,
    vehicle_type: String,
    vehicle_plate: Option<String>,
    status: String,
    rating: Decimal,
    completed_orders: i32,
    is_online: bool,
    last_seen_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourierRow> for Courier {
    type Error = CourierError;

    fn try_from(row: CourierRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            email: row.email,
            vehicle_type: row
                .vehicle_type
                .parse()
                .map_err(|e: String| CourierError::database("Corrupt courier row", e))?,
            vehicle_plate: row.vehicle_plate,
            status: row
                .status
                .parse()
                .map_err(|e: String| CourierError::database("Corrupt courier row", e))?,
            rating: row.rating,
            completed_orders: row.completed_orders,
            is_online: row.is_online,
            last_seen_at: row.last_seen_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    #[sqlx(flatten)]
    courier: CourierRow,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    distance_km: f64,
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    order_id: Uuid,
    courier_id: Uuid,
    status: String,
    pickup_location: serde_json::Value,
    delivery_location: serde_json::Value,
    estimated_distance_km: f64,
    estimated_duration_min: i32,
    actual_distance_km: Option<f64>,
    actual_duration_min: Option<i32>,
    accepted_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = CourierError;

    fn try_from(row: AssignmentRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            courier_id: row.courier_id,
            status: row
                .status
                .parse()
                .map_err(|e: String| CourierError::database("Corrupt assignment row", e))?,
            pickup_location: serde_json::from_value(row.pickup_location)
                .map_err(|e| CourierError::database("Corrupt pickup location", e))?,
            delivery_location: serde_json::from_value(row.delivery_location)
                .map_err(|e| CourierError::database("Corrupt delivery location", e))?,
            estimated_distance_km: row.estimated_distance_km,
            estimated_duration_min: row.estimated_duration_min,
            actual_distance_km: row.actual_distance_km,
            actual_duration_min: row.actual_duration_min,
            accepted_at: row.accepted_at,
            rejected_at: row.rejected_at,
            completed_at: row.completed_at,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ASSIGNMENT_COLUMNS: &str = "id, order_id, courier_id, status, pickup_location, \
     delivery_location, estimated_distance_km, estimated_duration_min, actual_distance_km, \
     actual_duration_min, accepted_at, rejected_at, completed_at, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct LocationRow {
    courier_id: Uuid,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    speed: Option<f64>,
    heading: Option<f64>,
    accuracy: Option<f64>,
    recorded_at: DateTime<Utc>,
}

impl From<LocationRow> for CourierLocationUpdate {
    fn from(row: LocationRow) -> Self {
        Self {
            courier_id: row.courier_id,
            location: Location {
                latitude: row.latitude,
                longitude: row.longitude,
                address: row.address,
            },
            speed: row.speed,
            heading: row.heading,
            accuracy: row.accuracy,
            timestamp: row.recorded_at,
        }
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
    .map_err(|e| CourierError::database("Failed to insert outbox event", e))?;
    Ok(())
}

// ============================================================================
// Courier store
// ============================================================================

/// PostgreSQL courier store.
#[derive(Clone)]
pub struct PostgresCourierStore {
    pool: PgPool,
}

impl PostgresCourierStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourierStore for PostgresCourierStore {
    async fn create(&self, courier: &Courier) -> Result<()> {
        sqlx::query(
            "INSERT INTO couriers
                (id, user_id, first_name, last_name, phone, email, vehicle_type, vehicle_plate,
                 status, rating, completed_orders, is_online, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(courier.id)
        .bind(courier.user_id)
        .bind(&courier.first_name)
        .bind(&courier.last_name)
        .bind(&courier.phone)
        .bind(&courier.email)
        .bind(courier.vehicle_type.as_str())
        .bind(&courier.vehicle_plate)
        .bind(courier.status.as_str())
        .bind(courier.rating)
        .bind(courier.completed_orders)
        .bind(courier.is_online)
        .bind(courier.created_at)
        .bind(courier.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to create courier", e))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Courier>> {
        let row: Option<CourierRow> =
            sqlx::query_as(&format!("SELECT {COURIER_COLUMNS} FROM couriers WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CourierError::database("Failed to load courier", e))?;

        row.map(Courier::try_from).transpose()
    }

    async fn update(&self, id: Uuid, req: UpdateCourierRequest) -> Result<()> {
        let result = sqlx::query(
            "UPDATE couriers
             SET first_name = COALESCE($2, first_name),
                 last_name = COALESCE($3, last_name),
                 phone = COALESCE($4, phone),
                 email = COALESCE($5, email),
                 vehicle_type = COALESCE($6, vehicle_type),
                 vehicle_plate = COALESCE($7, vehicle_plate),
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(req.first_name)
        .bind(req.last_name)
        .bind(req.phone)
        .bind(req.email)
        .bind(req.vehicle_type.map(|v| v.as_str()))
        .bind(req.vehicle_plate)
        .execute(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to update courier", e))?;

        if result.rows_affected() == 0 {
            return Err(CourierError::NotFound("Courier"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM couriers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CourierError::database("Failed to delete courier", e))?;

        if result.rows_affected() == 0 {
            return Err(CourierError::NotFound("Courier"));
        }
        Ok(())
    }

    async fn list(
        &self,
        status: Option<CourierStatus>,
        vehicle: Option<VehicleType>,
        page: ListPage,
    ) -> Result<(Vec<Courier>, i64)> {
        let status = status.map(CourierStatus::as_str);
        let vehicle = vehicle.map(VehicleType::as_str);

        let rows: Vec<CourierRow> = sqlx::query_as(&format!(
            "SELECT {COURIER_COLUMNS} FROM couriers
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR vehicle_type = $2)
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(status)
        .bind(vehicle)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to list couriers", e))?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM couriers
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR vehicle_type = $2)",
        )
        .bind(status)
        .bind(vehicle)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to count couriers", e))?;

        let couriers = rows
            .into_iter()
            .map(Courier::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((couriers, total))
    }

    async fn find_available(
        &self,
        pickup: &Location,
        max_distance_km: f64,
        vehicle: Option<VehicleType>,
        freshness: Duration,
    ) -> Result<Vec<CourierCandidate>> {
        // Haversine over the latest location per courier, evaluated in SQL
        // so the distance cap and the ordering happen before rows leave the
        // database.
        let rows: Vec<CandidateRow> = sqlx::query_as(&format!(
            "SELECT * FROM (
                 SELECT {COURIER_COLUMNS_QUALIFIED},
                        cl.latitude, cl.longitude, cl.address,
                        6371.0 * 2 * asin(sqrt(
                            power(sin(radians($1 - cl.latitude) / 2), 2) +
                            cos(radians(cl.latitude)) * cos(radians($1)) *
                            power(sin(radians($2 - cl.longitude) / 2), 2)
                        )) AS distance_km
                 FROM couriers c
                 JOIN LATERAL (
                     SELECT latitude, longitude, address, recorded_at
                     FROM courier_locations
                     WHERE courier_id = c.id
                     ORDER BY recorded_at DESC
                     LIMIT 1
                 ) cl ON true
                 WHERE c.status = 'ACTIVE'
                   AND c.is_online = true
                   AND cl.recorded_at > now() - make_interval(secs => $3)
                   AND ($4::text IS NULL OR c.vehicle_type = $4)
             ) candidates
             WHERE distance_km <= $5
             ORDER BY distance_km ASC, rating DESC, completed_orders DESC
             LIMIT 50",
            COURIER_COLUMNS_QUALIFIED = qualified_courier_columns()
        ))
        .bind(pickup.latitude)
        .bind(pickup.longitude)
        .bind(freshness.as_secs_f64())
        .bind(vehicle.map(VehicleType::as_str))
        .bind(max_distance_km)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to find available couriers", e))?;

        rows.into_iter()
            .map(|row| {
                Ok(CourierCandidate {
                    location: Location {
                        latitude: row.latitude,
                        longitude: row.longitude,
                        address: row.address.clone(),
                    },
                    distance_km: row.distance_km,
                    courier: Courier::try_from(row.courier)?,
                })
            })
            .collect()
    }

    async fn set_status(&self, id: Uuid, status: CourierStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE couriers SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| CourierError::database("Failed to set courier status", e))?;

        if result.rows_affected() == 0 {
            return Err(CourierError::NotFound("Courier"));
        }
        Ok(())
    }

    async fn set_online(&self, id: Uuid, online: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE couriers
             SET is_online = $2,
                 last_seen_at = CASE WHEN $2 THEN now() ELSE last_seen_at END,
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(online)
        .execute(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to set online flag", e))?;

        if result.rows_affected() == 0 {
            return Err(CourierError::NotFound("Courier"));
        }
        Ok(())
    }

    async fn increment_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE couriers SET completed_orders = completed_orders + 1, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to increment completed orders", e))?;
        Ok(())
    }

    async fn service_areas(&self, courier_id: Uuid) -> Result<Vec<ServiceArea>> {
        let rows: Vec<(Uuid, Uuid, f64, f64, f64, String, String, bool, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT id, courier_id, center_lat, center_lng, radius_km, city, district,
                        is_active, created_at
                 FROM courier_service_areas WHERE courier_id = $1",
            )
            .bind(courier_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CourierError::database("Failed to load service areas", e))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, courier_id, center_lat, center_lng, radius_km, city, district, is_active, created_at)| {
                    ServiceArea {
                        id,
                        courier_id,
                        center_lat,
                        center_lng,
                        radius_km,
                        city,
                        district,
                        is_active,
                        created_at,
                    }
                },
            )
            .collect())
    }

    async fn add_service_area(&self, area: &ServiceArea) -> Result<()> {
        sqlx::query(
            "INSERT INTO courier_service_areas
                (id, courier_id, center_lat, center_lng, radius_km, city, district, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(area.id)
        .bind(area.courier_id)
        .bind(area.center_lat)
        .bind(area.center_lng)
        .bind(area.radius_km)
        .bind(&area.city)
        .bind(&area.district)
        .bind(area.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to add service area", e))?;
        Ok(())
    }

    async fn working_hours(&self, courier_id: Uuid) -> Result<Vec<WorkingHours>> {
        let rows: Vec<(Uuid, Uuid, i32, String, String)> = sqlx::query_as(
            "SELECT id, courier_id, day_of_week, start_time, end_time
             FROM courier_working_hours WHERE courier_id = $1
             ORDER BY day_of_week, start_time",
        )
        .bind(courier_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to load working hours", e))?;

        Ok(rows
            .into_iter()
            .map(|(id, courier_id, day_of_week, start_time, end_time)| WorkingHours {
                id,
                courier_id,
                day_of_week,
                start_time,
                end_time,
            })
            .collect())
    }

    async fn add_working_hours(&self, hours: &WorkingHours) -> Result<()> {
        sqlx::query(
            "INSERT INTO courier_working_hours (id, courier_id, day_of_week, start_time, end_time)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(hours.id)
        .bind(hours.courier_id)
        .bind(hours.day_of_week)
        .bind(&hours.start_time)
        .bind(&hours.end_time)
        .execute(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to add working hours", e))?;
        Ok(())
    }

    async fn performance_stats(&self, courier_id: Uuid) -> Result<CourierPerformanceStats> {
        let (total, completed, canceled, average_delivery_minutes): (i64, i64, i64, Option<f64>) =
            sqlx::query_as(
                "SELECT COUNT(*),
                        COUNT(*) FILTER (WHERE status = 'COMPLETED'),
                        COUNT(*) FILTER (WHERE status IN ('CANCELED', 'REJECTED')),
                        (AVG(EXTRACT(EPOCH FROM (completed_at - created_at)) / 60.0)
                            FILTER (WHERE status = 'COMPLETED'))::double precision
                 FROM assignments WHERE courier_id = $1",
            )
            .bind(courier_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CourierError::database("Failed to compute performance stats", e))?;

        Ok(CourierPerformanceStats {
            courier_id,
            total_assignments: total,
            completed,
            canceled,
            average_delivery_minutes,
        })
    }
}

/// The courier columns qualified with the `c.` alias used by the candidate
/// query.
fn qualified_courier_columns() -> String {
    COURIER_COLUMNS
        .split(", ")
        .map(|col| format!("c.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Assignment store
// ============================================================================

/// PostgreSQL assignment store.
#[derive(Clone)]
pub struct PostgresAssignmentStore {
    pool: PgPool,
}

impl PostgresAssignmentStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentStore for PostgresAssignmentStore {
    async fn create(&self, assignment: &Assignment, event: &OutboxEvent) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CourierError::database("Failed to begin transaction", e))?;

        sqlx::query(
            "INSERT INTO assignments
                (id, order_id, courier_id, status, pickup_location, delivery_location,
                 estimated_distance_km, estimated_duration_min, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(assignment.id)
        .bind(assignment.order_id)
        .bind(assignment.courier_id)
        .bind(assignment.status.as_str())
        .bind(serde_json::to_value(&assignment.pickup_location)?)
        .bind(serde_json::to_value(&assignment.delivery_location)?)
        .bind(assignment.estimated_distance_km)
        .bind(assignment.estimated_duration_min)
        .bind(&assignment.notes)
        .bind(assignment.created_at)
        .bind(assignment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return CourierError::AlreadyAssigned;
                }
            }
            CourierError::database("Failed to create assignment", e)
        })?;

        sqlx::query("UPDATE couriers SET status = 'BUSY', updated_at = now() WHERE id = $1")
            .bind(assignment.courier_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CourierError::database("Failed to mark courier busy", e))?;

        insert_outbox(&mut tx, event).await?;

        tx.commit()
            .await
            .map_err(|e| CourierError::database("Failed to commit assignment", e))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Assignment>> {
        let row: Option<AssignmentRow> = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to load assignment", e))?;

        row.map(Assignment::try_from).transpose()
    }

    async fn active_for_order(&self, order_id: Uuid) -> Result<Option<Assignment>> {
        let row: Option<AssignmentRow> = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
             WHERE order_id = $1 AND status IN ('PENDING', 'ACCEPTED')"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to load active assignment", e))?;

        row.map(Assignment::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        notes: Option<String>,
    ) -> Result<Assignment> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CourierError::database("Failed to begin transaction", e))?;

        let row: Option<AssignmentRow> = sqlx::query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CourierError::database("Failed to lock assignment", e))?;

        let mut assignment = Assignment::try_from(row.ok_or(CourierError::NotFound("Assignment"))?)?;
        apply_assignment_transition(&mut assignment, status, notes)?;

        sqlx::query(
            "UPDATE assignments
             SET status = $2, accepted_at = $3, rejected_at = $4, completed_at = $5,
                 actual_duration_min = $6, notes = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(assignment.id)
        .bind(assignment.status.as_str())
        .bind(assignment.accepted_at)
        .bind(assignment.rejected_at)
        .bind(assignment.completed_at)
        .bind(assignment.actual_duration_min)
        .bind(&assignment.notes)
        .bind(assignment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| CourierError::database("Failed to update assignment", e))?;

        tx.commit()
            .await
            .map_err(|e| CourierError::database("Failed to commit assignment update", e))?;

        Ok(assignment)
    }
}

// ============================================================================
// Location store
// ============================================================================

/// PostgreSQL append-only location history.
#[derive(Clone)]
pub struct PostgresLocationStore {
    pool: PgPool,
}

impl PostgresLocationStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocationStore for PostgresLocationStore {
    async fn append(&self, update: &CourierLocationUpdate) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CourierError::database("Failed to begin transaction", e))?;

        sqlx::query(
            "INSERT INTO courier_locations
                (courier_id, latitude, longitude, address, speed, heading, accuracy, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(update.courier_id)
        .bind(update.location.latitude)
        .bind(update.location.longitude)
        .bind(&update.location.address)
        .bind(update.speed)
        .bind(update.heading)
        .bind(update.accuracy)
        .bind(update.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| CourierError::database("Failed to append location", e))?;

        // A location report proves the courier is alive.
        sqlx::query(
            "UPDATE couriers SET last_seen_at = $2, is_online = true, updated_at = now()
             WHERE id = $1",
        )
        .bind(update.courier_id)
        .bind(update.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| CourierError::database("Failed to bump last_seen_at", e))?;

        tx.commit()
            .await
            .map_err(|e| CourierError::database("Failed to commit location", e))
    }

    async fn latest(&self, courier_id: Uuid) -> Result<Option<CourierLocationUpdate>> {
        let row: Option<LocationRow> = sqlx::query_as(
            "SELECT courier_id, latitude, longitude, address, speed, heading, accuracy, recorded_at
             FROM courier_locations WHERE courier_id = $1
             ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(courier_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to load latest location", e))?;

        Ok(row.map(CourierLocationUpdate::from))
    }

    async fn history(&self, courier_id: Uuid, limit: i64) -> Result<Vec<CourierLocationUpdate>> {
        let rows: Vec<LocationRow> = sqlx::query_as(
            "SELECT courier_id, latitude, longitude, address, speed, heading, accuracy, recorded_at
             FROM courier_locations WHERE courier_id = $1
             ORDER BY recorded_at DESC LIMIT $2",
        )
        .bind(courier_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CourierError::database("Failed to load location history", e))?;

        Ok(rows.into_iter().map(CourierLocationUpdate::from).collect())
    }
}
