// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Slot holds live exactly this long; the TTL is fixed so a client cannot
/// starve a slot by renewing its claim.
pub const HOLD_TTL_MINUTES: i64 = 10;

/// PostgREST filter matching every appointment status that still occupies
/// its slot.
pub const ACTIVE_STATUS_FILTER: &str = "status=in.(pending,confirmed,in_progress)";

// ==============================================================================
// SCHEDULE AND SERVICE CATALOG ROWS
// ==============================================================================

/// One weekly working window of a doctor, `[start_time, end_time)`.
/// `day_of_week` is 0 (Sunday) through 6 (Saturday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// A bookable service. Price and deposit are integer minor units so the
/// ledger arithmetic stays exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicService {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price_cents: i64,
    pub deposit_percent: i32,
}

impl ClinicService {
    pub fn deposit_cents(&self) -> i64 {
        self.price_cents * self.deposit_percent as i64 / 100
    }
}

/// Join row: a doctor performs a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorServiceLink {
    pub doctor_id: Uuid,
}

/// Clinic-wide closure date; membership alone disables the whole day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedDate {
    pub date: NaiveDate,
    pub reason: Option<String>,
}

/// Projection of an appointment row, just enough to subtract its interval
/// from the candidate grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupiedSlot {
    pub time: NaiveTime,
    pub duration_minutes: i32,
}

/// A free slot offered to the booking flow, tagged with the doctor since a
/// service may be performed by several doctors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub doctor_id: Uuid,
    pub time: NaiveTime,
}

// ==============================================================================
// SLOT HOLDS
// ==============================================================================

/// The contended tuple: one unexpired hold or one non-terminal appointment
/// may occupy it, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Ephemeral reservation of a slot while a patient walks through checkout.
/// Owned exclusively by the hold manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotHold {
    pub token: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SlotHold {
    pub fn issue(
        doctor_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: Uuid::new_v4(),
            doctor_id,
            service_id,
            date,
            time,
            duration_minutes,
            created_at: now,
            expires_at: now + Duration::minutes(HOLD_TTL_MINUTES),
        }
    }

    /// Expiry is a predicate over `now`, not an event: an expired hold is
    /// treated as absent everywhere, whether or not the sweeper ran.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            time: self.time,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Slot is already held or booked")]
    SlotTaken,

    #[error("Hold token unknown, expired or already consumed")]
    HoldNotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
