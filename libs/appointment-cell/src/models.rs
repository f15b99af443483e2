// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub booker_name: String,
    pub booker_phone: String,
    pub booker_email: Option<String>,
    pub consent_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// Scheduled start as an instant; clinic times are kept in UTC.
    pub fn start_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        self.start_at() + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Terminal statuses permit no outbound transitions, ever.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// A non-terminal appointment still occupies its slot.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// Append-only audit row; one per transition, plus a creation row with no
/// previous status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub previous_status: Option<AppointmentStatus>,
    pub new_status: AppointmentStatus,
    pub changed_by: Uuid,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

// ==============================================================================
// PAYMENT LEDGER MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    Ewallet,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::BankTransfer => write!(f, "bank_transfer"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Ewallet => write!(f, "ewallet"),
        }
    }
}

/// One ledger per appointment, created when the deposit is recorded. Amounts
/// are integer minor units; the deposit itself is immutable, only balance
/// payments accumulate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLedger {
    pub appointment_id: Uuid,
    pub total_cents: i64,
    pub deposit_cents: i64,
    pub deposit_method: PaymentMethod,
    pub deposit_paid_at: DateTime<Utc>,
    pub balance_settled_at: Option<DateTime<Utc>>,
    pub balance_method: Option<PaymentMethod>,
}

impl PaymentLedger {
    pub fn remaining_after(&self, payments: &[BalancePayment]) -> i64 {
        let paid: i64 = payments.iter().map(|p| p.amount_cents).sum();
        self.total_cents - self.deposit_cents - paid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancePayment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub proof_ref: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Ledger plus its balance payments, with the remainder precomputed for
/// callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerView {
    pub ledger: PaymentLedger,
    pub payments: Vec<BalancePayment>,
    pub remaining_cents: i64,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub booker_name: String,
    pub booker_phone: String,
    pub booker_email: Option<String>,
    /// `pending` (default) or `confirmed`; confirmed entry records the
    /// deposit in the same request and therefore needs `deposit_method`.
    pub initial_status: Option<AppointmentStatus>,
    pub deposit_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStateRequest {
    pub target_status: AppointmentStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancePaymentRequest {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub proof_ref: Option<String>,
}

// ==============================================================================
// ATTENTION VIEW MODELS
// ==============================================================================

/// Staff-dashboard classification, derived from appointment and ledger state
/// on every read; never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttentionFlag {
    /// Confirmed and more than 15 minutes past the scheduled start.
    Late,
    /// Confirmed and within 15 minutes of the scheduled start.
    DueNow,
    /// Pending with the deposit already recorded.
    AwaitingConfirmation,
    /// In progress with an outstanding balance.
    NeedsPayment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionEntry {
    pub appointment: Appointment,
    pub flag: AttentionFlag,
    pub remaining_cents: Option<i64>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment status changed concurrently")]
    StaleStatus,

    #[error("Deposit must be recorded before confirmation")]
    DepositRequired,

    #[error("Consultations can only be started on the appointment day")]
    NotSameDay,

    #[error("Outstanding balance of {remaining_cents} must be settled first")]
    BalanceNotSettled { remaining_cents: i64 },

    #[error("Deposit already recorded for this appointment")]
    DepositAlreadyRecorded,

    #[error("Payment of {attempted_cents} exceeds remaining balance of {remaining_cents}")]
    OverpaymentRejected {
        attempted_cents: i64,
        remaining_cents: i64,
    },

    #[error("No payment ledger for this appointment")]
    LedgerNotFound,

    #[error("Slot is already held or booked")]
    SlotTaken,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<scheduling_cell::models::SchedulingError> for AppointmentError {
    fn from(err: scheduling_cell::models::SchedulingError) -> Self {
        use scheduling_cell::models::SchedulingError;
        match err {
            SchedulingError::SlotTaken | SchedulingError::HoldNotFound => AppointmentError::SlotTaken,
            SchedulingError::ServiceNotFound => {
                AppointmentError::ValidationError("Unknown service".to_string())
            }
            SchedulingError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}
