// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, StateHistoryEntry};

/// The transition table. Pure: every persistent effect lives in
/// `AppointmentStateService`.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status.clone(),
                to: new_status.clone(),
            });
        }

        Ok(())
    }

    /// All valid next statuses for a given current status. Cancellation is
    /// reachable from every non-terminal status; terminal statuses have no
    /// exits regardless of actor or reason.
    pub fn valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::NoShow,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    /// Fold a history log back into the status it ends at. Used by audits to
    /// check that the stored status matches its own transition sequence.
    pub fn replay_status(&self, history: &[StateHistoryEntry]) -> Option<AppointmentStatus> {
        history.last().map(|entry| entry.new_status.clone())
    }

    /// A confirmed appointment more than 30 minutes past its start is a
    /// candidate for staff no-show marking. Advisory only; the engine never
    /// transitions on its own.
    pub fn overdue_no_show(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        appointment.status == AppointmentStatus::Confirmed
            && now > appointment.start_at() + Duration::minutes(30)
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use uuid::Uuid;

    fn lifecycle() -> AppointmentLifecycleService {
        AppointmentLifecycleService::new()
    }

    #[test]
    fn pending_confirms_or_cancels() {
        let lc = lifecycle();
        lc.validate_status_transition(&AppointmentStatus::Pending, &AppointmentStatus::Confirmed)
            .unwrap();
        lc.validate_status_transition(&AppointmentStatus::Pending, &AppointmentStatus::Cancelled)
            .unwrap();

        let skip = lc.validate_status_transition(
            &AppointmentStatus::Pending,
            &AppointmentStatus::InProgress,
        );
        assert_matches!(skip, Err(AppointmentError::InvalidTransition { .. }));
    }

    #[test]
    fn confirmed_starts_no_shows_or_cancels() {
        let lc = lifecycle();
        for target in [
            AppointmentStatus::InProgress,
            AppointmentStatus::NoShow,
            AppointmentStatus::Cancelled,
        ] {
            lc.validate_status_transition(&AppointmentStatus::Confirmed, &target).unwrap();
        }

        let complete = lc.validate_status_transition(
            &AppointmentStatus::Confirmed,
            &AppointmentStatus::Completed,
        );
        assert_matches!(complete, Err(AppointmentError::InvalidTransition { .. }));
    }

    #[test]
    fn in_progress_completes_or_cancels() {
        let lc = lifecycle();
        lc.validate_status_transition(&AppointmentStatus::InProgress, &AppointmentStatus::Completed)
            .unwrap();
        lc.validate_status_transition(&AppointmentStatus::InProgress, &AppointmentStatus::Cancelled)
            .unwrap();
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        let lc = lifecycle();
        let all = [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ];

        for terminal in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(lc.valid_transitions(&terminal).is_empty());
            for target in &all {
                assert_matches!(
                    lc.validate_status_transition(&terminal, target),
                    Err(AppointmentError::InvalidTransition { .. })
                );
            }
        }
    }

    #[test]
    fn cancellation_reachable_from_every_non_terminal_status() {
        let lc = lifecycle();
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::InProgress,
        ] {
            lc.validate_status_transition(&status, &AppointmentStatus::Cancelled).unwrap();
        }
    }

    fn history_entry(
        appointment_id: Uuid,
        previous: Option<AppointmentStatus>,
        new: AppointmentStatus,
        minute: u32,
    ) -> StateHistoryEntry {
        StateHistoryEntry {
            id: Uuid::new_v4(),
            appointment_id,
            previous_status: previous,
            new_status: new,
            changed_by: Uuid::new_v4(),
            reason: None,
            changed_at: Utc.with_ymd_and_hms(2030, 6, 1, 9, minute, 0).unwrap(),
        }
    }

    #[test]
    fn replay_reproduces_final_status() {
        let lc = lifecycle();
        let id = Uuid::new_v4();
        let history = vec![
            history_entry(id, None, AppointmentStatus::Pending, 0),
            history_entry(id, Some(AppointmentStatus::Pending), AppointmentStatus::Confirmed, 10),
            history_entry(id, Some(AppointmentStatus::Confirmed), AppointmentStatus::InProgress, 20),
            history_entry(id, Some(AppointmentStatus::InProgress), AppointmentStatus::Completed, 50),
        ];

        assert_eq!(lc.replay_status(&history), Some(AppointmentStatus::Completed));
        assert_eq!(lc.replay_status(&[]), None);
    }

    #[test]
    fn overdue_no_show_needs_confirmed_and_thirty_minutes() {
        let lc = lifecycle();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 30,
            status: AppointmentStatus::Confirmed,
            booker_name: "Dana Reyes".to_string(),
            booker_phone: "+15550100".to_string(),
            booker_email: None,
            consent_ref: None,
            created_at: Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap(),
        };

        let just_late = Utc.with_ymd_and_hms(2030, 6, 1, 9, 29, 0).unwrap();
        assert!(!lc.overdue_no_show(&appointment, just_late));

        let well_late = Utc.with_ymd_and_hms(2030, 6, 1, 9, 31, 0).unwrap();
        assert!(lc.overdue_no_show(&appointment, well_late));

        let mut pending = appointment;
        pending.status = AppointmentStatus::Pending;
        assert!(!lc.overdue_no_show(&pending, well_late));
    }
}
