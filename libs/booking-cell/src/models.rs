// libs/booking-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::{AppointmentError, PaymentMethod};
use scheduling_cell::models::SchedulingError;

// ==============================================================================
// PUBLIC BOOKING FLOW MODELS
// ==============================================================================

/// Step 1 payload: who is booking what. The patient record itself is managed
/// elsewhere; the flow only snapshots the booker's contact details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingIntake {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub booker_name: String,
    pub booker_phone: String,
    pub booker_email: Option<String>,
}

/// Step 1 response: the hold token plus the human-readable reference the
/// patient writes on their transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldGrant {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
    pub payment_reference: String,
}

/// Step 3 payload: redeem the hold with proof of the deposit payment.
/// One-shot; an expired or consumed token sends the patient back to slot
/// selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub patient_id: Uuid,
    pub booker_name: String,
    pub booker_phone: String,
    pub booker_email: Option<String>,
    pub method: PaymentMethod,
    pub proof_ref: String,
}

/// Step 4 payload: the signed consent artifact reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub signature_ref: String,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    /// The requested slot is not on offer (anymore): held, booked, off the
    /// grid, blocked or in the past. The client picks another slot.
    #[error("Slot is no longer available")]
    SlotUnavailable,

    /// The hold token is unknown, expired or already consumed; the client
    /// restarts slot selection.
    #[error("Booking hold has expired")]
    HoldExpired,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SchedulingError> for BookingError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::SlotTaken => BookingError::SlotUnavailable,
            SchedulingError::HoldNotFound => BookingError::HoldExpired,
            SchedulingError::ServiceNotFound => BookingError::ServiceNotFound,
            SchedulingError::DatabaseError(msg) => BookingError::DatabaseError(msg),
        }
    }
}

impl From<AppointmentError> for BookingError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => BookingError::AppointmentNotFound,
            AppointmentError::SlotTaken => BookingError::SlotUnavailable,
            AppointmentError::ValidationError(msg) => BookingError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => BookingError::DatabaseError(msg),
            other => BookingError::DatabaseError(other.to_string()),
        }
    }
}
