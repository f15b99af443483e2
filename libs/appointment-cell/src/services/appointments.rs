// libs/appointment-cell/src/services/appointments.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use scheduling_cell::models::SlotHold;
use scheduling_cell::services::availability::AvailabilityService;
use scheduling_cell::services::holds::SlotHoldService;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest, StateHistoryEntry,
};

/// Persistence of appointment rows and their history log. Rows are never
/// deleted; cancellation is a terminal status, not a delete.
pub struct AppointmentDirectory {
    supabase: Arc<SupabaseClient>,
    holds: Arc<SlotHoldService>,
    availability: Arc<AvailabilityService>,
}

impl AppointmentDirectory {
    pub fn new(
        supabase: Arc<SupabaseClient>,
        holds: Arc<SlotHoldService>,
        availability: Arc<AvailabilityService>,
    ) -> Self {
        Self {
            supabase,
            holds,
            availability,
        }
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    pub async fn list_for_day(
        &self,
        date: NaiveDate,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!("/rest/v1/appointments?date=eq.{}&order=time.asc", date);
        if let Some(doctor_id) = doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }

        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Convert a redeemed hold into a pending appointment. The hold is still
    /// claiming the slot while this runs (begin/commit redeem protocol), so
    /// no competing hold or appointment can appear on the tuple.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_booked(
        &self,
        hold: &SlotHold,
        patient_id: Uuid,
        booker_name: &str,
        booker_phone: &str,
        booker_email: Option<&str>,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        self.insert_row(
            patient_id,
            hold.doctor_id,
            hold.service_id,
            hold.date,
            hold.time,
            hold.duration_minutes,
            AppointmentStatus::Pending,
            booker_name,
            booker_phone,
            booker_email,
            actor,
            now,
        )
        .await
    }

    /// Staff direct entry: claims the slot through the hold manager so the
    /// double-booking invariant holds on this path too, probes for interval
    /// overlap (staff times need not sit on the public grid), inserts as
    /// pending. Confirmation with its deposit runs through the state machine
    /// afterwards.
    pub async fn create_direct(
        &self,
        request: &CreateAppointmentRequest,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        if request.booker_name.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Booker name is required".to_string(),
            ));
        }

        let service = self.availability.service(request.service_id).await?;

        if self
            .availability
            .overlaps_existing(request.doctor_id, request.date, request.time, service.duration_minutes)
            .await?
        {
            warn!(
                "Direct entry overlaps an existing appointment: doctor {} on {} at {}",
                request.doctor_id, request.date, request.time
            );
            return Err(AppointmentError::SlotTaken);
        }

        let claim = self
            .holds
            .create_hold(
                request.doctor_id,
                request.service_id,
                request.date,
                request.time,
                service.duration_minutes,
                now,
            )
            .await?;

        let inserted = self
            .insert_row(
                request.patient_id,
                request.doctor_id,
                request.service_id,
                request.date,
                request.time,
                service.duration_minutes,
                AppointmentStatus::Pending,
                &request.booker_name,
                &request.booker_phone,
                request.booker_email.as_deref(),
                actor,
                now,
            )
            .await;

        self.holds.release_hold(claim.token).await;
        inserted
    }

    /// Attach the consent artifact reference; no lifecycle effect.
    pub async fn set_consent_ref(
        &self,
        appointment_id: Uuid,
        consent_ref: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let body = json!({ "consent_ref": consent_ref });

        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    /// Append one history row. Called inside the same critical section as
    /// the status write it records.
    pub async fn append_history(
        &self,
        appointment_id: Uuid,
        previous_status: Option<&AppointmentStatus>,
        new_status: &AppointmentStatus,
        changed_by: Uuid,
        reason: Option<&str>,
        changed_at: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let body = json!({
            "appointment_id": appointment_id,
            "previous_status": previous_status,
            "new_status": new_status,
            "changed_by": changed_by,
            "reason": reason,
            "changed_at": changed_at,
        });

        self.supabase
            .execute(Method::POST, "/rest/v1/appointment_state_history", Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    pub async fn history(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<StateHistoryEntry>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_state_history?appointment_id=eq.{}&order=changed_at.asc",
            appointment_id
        );
        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_row(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: i32,
        status: AppointmentStatus,
        booker_name: &str,
        booker_phone: &str,
        booker_email: Option<&str>,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let body = json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "service_id": service_id,
            "date": date,
            "time": time,
            "duration_minutes": duration_minutes,
            "status": status,
            "booker_name": booker_name,
            "booker_phone": booker_phone,
            "booker_email": booker_email,
            "created_at": now,
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/appointments", Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Appointment insert returned no row".to_string())
        })?;

        self.append_history(appointment.id, None, &appointment.status, actor, None, now)
            .await?;

        info!(
            "Appointment {} created ({}) for doctor {} on {} at {}",
            appointment.id, appointment.status, doctor_id, date, time
        );
        Ok(appointment)
    }
}
