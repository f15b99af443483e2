// libs/appointment-cell/src/services/attention.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AttentionEntry, AttentionFlag,
};
use crate::services::appointments::AppointmentDirectory;
use crate::services::payments::PaymentLedgerService;

const DUE_WINDOW_MINUTES: i64 = 15;

/// Read-only classification the staff dashboard polls. Everything here is
/// derived from appointment and ledger state at call time; nothing is
/// stored.
pub struct AttentionService {
    directory: Arc<AppointmentDirectory>,
    payments: Arc<PaymentLedgerService>,
}

impl AttentionService {
    pub fn new(directory: Arc<AppointmentDirectory>, payments: Arc<PaymentLedgerService>) -> Self {
        Self { directory, payments }
    }

    pub async fn attention_for_day(
        &self,
        date: NaiveDate,
        doctor_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AttentionEntry>, AppointmentError> {
        let appointments = self.directory.list_for_day(date, doctor_id).await?;
        let mut entries = Vec::new();

        for appointment in appointments {
            if appointment.status.is_terminal() {
                continue;
            }

            // One ledger read per row is fine here; this serves a 30-second
            // dashboard poll, not a hot path.
            let deposit_recorded = self.payments.deposit_recorded(appointment.id).await?;
            let remaining_cents = if deposit_recorded {
                Some(self.payments.remaining_balance(appointment.id).await?)
            } else {
                None
            };

            if let Some(flag) = classify(&appointment, deposit_recorded, remaining_cents, now) {
                entries.push(AttentionEntry {
                    appointment,
                    flag,
                    remaining_cents,
                });
            }
        }

        Ok(entries)
    }
}

/// Pure classification of one appointment.
pub fn classify(
    appointment: &Appointment,
    deposit_recorded: bool,
    remaining_cents: Option<i64>,
    now: DateTime<Utc>,
) -> Option<AttentionFlag> {
    let start = appointment.start_at();

    match appointment.status {
        AppointmentStatus::Confirmed => {
            if now > start + Duration::minutes(DUE_WINDOW_MINUTES) {
                Some(AttentionFlag::Late)
            } else if (now - start).num_minutes().abs() <= DUE_WINDOW_MINUTES {
                Some(AttentionFlag::DueNow)
            } else {
                None
            }
        }
        AppointmentStatus::Pending if deposit_recorded => Some(AttentionFlag::AwaitingConfirmation),
        AppointmentStatus::InProgress if remaining_cents.unwrap_or(0) > 0 => {
            Some(AttentionFlag::NeedsPayment)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn appointment(status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            duration_minutes: 30,
            status,
            booker_name: "Dana Reyes".to_string(),
            booker_phone: "+15550100".to_string(),
            booker_email: None,
            consent_ref: None,
            created_at: Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn confirmed_past_grace_is_late() {
        let a = appointment(AppointmentStatus::Confirmed);
        assert_eq!(classify(&a, true, Some(0), at(10, 16)), Some(AttentionFlag::Late));
    }

    #[test]
    fn confirmed_near_start_is_due_now() {
        let a = appointment(AppointmentStatus::Confirmed);
        assert_eq!(classify(&a, true, Some(0), at(9, 50)), Some(AttentionFlag::DueNow));
        assert_eq!(classify(&a, true, Some(0), at(10, 10)), Some(AttentionFlag::DueNow));
    }

    #[test]
    fn confirmed_well_ahead_is_quiet() {
        let a = appointment(AppointmentStatus::Confirmed);
        assert_eq!(classify(&a, true, Some(0), at(8, 0)), None);
    }

    #[test]
    fn pending_with_deposit_awaits_confirmation() {
        let a = appointment(AppointmentStatus::Pending);
        assert_eq!(
            classify(&a, true, Some(50_000), at(8, 0)),
            Some(AttentionFlag::AwaitingConfirmation)
        );
        assert_eq!(classify(&a, false, None, at(8, 0)), None);
    }

    #[test]
    fn in_progress_with_balance_needs_payment() {
        let a = appointment(AppointmentStatus::InProgress);
        assert_eq!(
            classify(&a, true, Some(25_000), at(10, 20)),
            Some(AttentionFlag::NeedsPayment)
        );
        assert_eq!(classify(&a, true, Some(0), at(10, 20)), None);
    }
}
