// libs/appointment-cell/src/services/transitions.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, StateHistoryEntry};
use crate::services::appointments::AppointmentDirectory;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notify::NotificationService;
use crate::services::payments::PaymentLedgerService;

/// Drives appointments through the lifecycle. Transitions on one appointment
/// serialize on a per-appointment mutex; the conditional status filter on
/// the PATCH is the cross-process backstop, so two racing writers get at
/// most one success and the history log never claims the same previous
/// status twice.
pub struct AppointmentStateService {
    supabase: Arc<SupabaseClient>,
    directory: Arc<AppointmentDirectory>,
    payments: Arc<PaymentLedgerService>,
    notifier: Arc<NotificationService>,
    lifecycle: AppointmentLifecycleService,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AppointmentStateService {
    pub fn new(
        supabase: Arc<SupabaseClient>,
        directory: Arc<AppointmentDirectory>,
        payments: Arc<PaymentLedgerService>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            supabase,
            directory,
            payments,
            notifier,
            lifecycle: AppointmentLifecycleService::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Move an appointment to `target`, guarded by the transition table and
    /// the per-target business guards, and append exactly one history row.
    pub async fn change_status(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
        actor: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let lock = self.lock_for(appointment_id).await;
        let _guard = lock.lock().await;

        let appointment = self.directory.get(appointment_id).await?;

        self.lifecycle
            .validate_status_transition(&appointment.status, &target)?;

        match target {
            AppointmentStatus::Confirmed => {
                if !self.payments.deposit_recorded(appointment_id).await? {
                    return Err(AppointmentError::DepositRequired);
                }
            }
            AppointmentStatus::InProgress => {
                if appointment.date != now.date_naive() {
                    return Err(AppointmentError::NotSameDay);
                }
            }
            AppointmentStatus::Completed => {
                let remaining = self.payments.remaining_balance(appointment_id).await?;
                if remaining != 0 {
                    warn!(
                        "Completion of appointment {} rejected, {} outstanding",
                        appointment_id, remaining
                    );
                    return Err(AppointmentError::BalanceNotSettled {
                        remaining_cents: remaining,
                    });
                }
            }
            _ => {}
        }

        let updated = self.apply_status(&appointment, &target).await?;

        self.directory
            .append_history(
                appointment_id,
                Some(&appointment.status),
                &target,
                actor,
                reason.as_deref(),
                now,
            )
            .await?;

        info!(
            "Appointment {} moved {} -> {} by {}",
            appointment_id, appointment.status, target, actor
        );

        if matches!(
            target,
            AppointmentStatus::Confirmed | AppointmentStatus::Cancelled
        ) {
            self.notifier.notify_transition(&updated);
        }

        Ok(updated)
    }

    /// Full transition sequence for an appointment, oldest first.
    pub async fn transition_history(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<StateHistoryEntry>, AppointmentError> {
        self.directory.history(appointment_id).await
    }

    /// Conditional write: the filter pins the status we read, so a
    /// concurrent transition that already moved the row makes this match
    /// nothing and the caller gets `StaleStatus` instead of a double
    /// transition.
    async fn apply_status(
        &self,
        appointment: &Appointment,
        target: &AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment.id, appointment.status
        );
        let body = json!({ "status": target });

        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or_else(|| {
            warn!(
                "Appointment {} changed concurrently, expected status {}",
                appointment.id, appointment.status
            );
            AppointmentError::StaleStatus
        })
    }

    async fn lock_for(&self, appointment_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(appointment_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
