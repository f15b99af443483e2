// libs/booking-cell/src/services/orchestrator.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::models::Appointment;
use appointment_cell::services::appointments::AppointmentDirectory;
use appointment_cell::services::payments::PaymentLedgerService;
use scheduling_cell::models::{AvailableSlot, SlotHold};
use scheduling_cell::services::availability::AvailabilityService;
use scheduling_cell::services::holds::SlotHoldService;

use crate::models::{BookingError, BookingIntake, HoldGrant, RedeemRequest};

/// Coordinates the public four-step booking flow: intake claims a hold on a
/// slot, the confirm step is display-only, proof upload converts the hold
/// into a pending appointment with its deposit, and consent attaches the
/// signature artifact.
pub struct BookingOrchestrator {
    holds: Arc<SlotHoldService>,
    availability: Arc<AvailabilityService>,
    directory: Arc<AppointmentDirectory>,
    payments: Arc<PaymentLedgerService>,
}

impl BookingOrchestrator {
    pub fn new(
        holds: Arc<SlotHoldService>,
        availability: Arc<AvailabilityService>,
        directory: Arc<AppointmentDirectory>,
        payments: Arc<PaymentLedgerService>,
    ) -> Self {
        Self {
            holds,
            availability,
            directory,
            payments,
        }
    }

    /// Free slots shown to the patient before step 1.
    pub async fn available_slots(
        &self,
        service_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailableSlot>, BookingError> {
        Ok(self.availability.slots_for_service(service_id, date, now).await?)
    }

    /// Step 1: validate the intake and claim the slot. The requested time
    /// must be one the calculator would offer right now, so off-grid or
    /// already-taken times never reach the hold table.
    pub async fn begin_booking(
        &self,
        intake: &BookingIntake,
        now: DateTime<Utc>,
    ) -> Result<HoldGrant, BookingError> {
        validate_intake(intake)?;

        let service = self.availability.service(intake.service_id).await?;

        let offered = self
            .availability
            .compute_slots(intake.doctor_id, intake.service_id, intake.date, now)
            .await?;
        if !offered.contains(&intake.time) {
            debug!(
                "Requested slot {} on {} not on offer for doctor {}",
                intake.time, intake.date, intake.doctor_id
            );
            return Err(BookingError::SlotUnavailable);
        }

        let hold = self
            .holds
            .create_hold(
                intake.doctor_id,
                intake.service_id,
                intake.date,
                intake.time,
                service.duration_minutes,
                now,
            )
            .await?;

        info!(
            "Booking session opened: hold {} for patient {} on {} at {}",
            hold.token, intake.patient_id, intake.date, intake.time
        );

        Ok(HoldGrant {
            token: hold.token,
            payment_reference: payment_reference(&hold.token),
            expires_at: hold.expires_at,
        })
    }

    /// Step 2 going "back": give the slot up early. Idempotent.
    pub async fn abandon(&self, token: Uuid) -> bool {
        self.holds.release_hold(token).await
    }

    /// Step 3: one-shot conversion of the hold into a pending appointment
    /// plus its deposit ledger. An expired or consumed token reports
    /// `HoldExpired` and is never retried here; the client restarts slot
    /// selection.
    pub async fn redeem(
        &self,
        token: Uuid,
        request: &RedeemRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        if request.proof_ref.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "Payment proof reference is required".to_string(),
            ));
        }

        let hold = self.holds.begin_redeem(token, now).await?;

        // The hold keeps claiming the slot until commit/abort, so the
        // persistence below cannot race a competing hold on the same tuple.
        match self.finalize_booking(&hold, request, now).await {
            Ok(appointment) => {
                self.holds.commit_redeem(token).await;
                info!(
                    "Booking completed: hold {} became appointment {}",
                    token, appointment.id
                );
                Ok(appointment)
            }
            Err(e) => {
                warn!("Booking finalization for hold {} failed: {}", token, e);
                self.holds.abort_redeem(token).await;
                Err(e)
            }
        }
    }

    /// Step 4: attach the consent signature; no lifecycle effect.
    pub async fn attach_consent(
        &self,
        appointment_id: Uuid,
        signature_ref: &str,
    ) -> Result<Appointment, BookingError> {
        if signature_ref.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "Signature reference is required".to_string(),
            ));
        }

        Ok(self.directory.set_consent_ref(appointment_id, signature_ref).await?)
    }

    async fn finalize_booking(
        &self,
        hold: &SlotHold,
        request: &RedeemRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        let service = self.availability.service(hold.service_id).await?;

        let appointment = self
            .directory
            .insert_booked(
                hold,
                request.patient_id,
                &request.booker_name,
                &request.booker_phone,
                request.booker_email.as_deref(),
                request.patient_id,
                now,
            )
            .await?;

        self.payments
            .record_deposit(
                appointment.id,
                service.price_cents,
                service.deposit_cents(),
                request.method.clone(),
                now,
            )
            .await?;

        Ok(appointment)
    }
}

/// Human-readable payment reference, stable per token so the patient and the
/// clinic can re-derive it from the booking session.
pub fn payment_reference(token: &Uuid) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!(
        "PAY-{:02X}{:02X}{:02X}{:02X}",
        digest[0], digest[1], digest[2], digest[3]
    )
}

fn validate_intake(intake: &BookingIntake) -> Result<(), BookingError> {
    let name = intake.booker_name.trim();
    if name.is_empty() || name.len() > 120 {
        return Err(BookingError::ValidationError(
            "Booker name must be between 1 and 120 characters".to_string(),
        ));
    }

    let phone_regex = Regex::new(r"^\+?[0-9][0-9 \-]{6,19}$").unwrap();
    if !phone_regex.is_match(intake.booker_phone.trim()) {
        return Err(BookingError::ValidationError(
            "Booker phone number is not valid".to_string(),
        ));
    }

    if let Some(email) = &intake.booker_email {
        let email_regex = Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap();
        if !email_regex.is_match(email) || email.len() > 254 {
            return Err(BookingError::ValidationError(
                "Booker email is not valid".to_string(),
            ));
        }
    }

    Ok(())
}
