// libs/booking-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{BookingError, BookingIntake, ConsentRequest, RedeemRequest};
use crate::router::BookingCellState;

#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub service_id: Uuid,
    pub date: NaiveDate,
}

fn to_app_error(e: BookingError) -> AppError {
    match e {
        BookingError::SlotUnavailable => AppError::Conflict(e.to_string()),
        BookingError::HoldExpired => AppError::Gone(e.to_string()),
        BookingError::ServiceNotFound => AppError::NotFound("Service not found".to_string()),
        BookingError::AppointmentNotFound => {
            AppError::NotFound("Appointment not found".to_string())
        }
        BookingError::ValidationError(msg) => AppError::BadRequest(msg),
        BookingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// PUBLIC BOOKING FLOW HANDLERS
// ==============================================================================

/// Slots the patient can pick from; empty means fully booked.
#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<BookingCellState>,
    Query(params): Query<SlotQueryParams>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .orchestrator
        .available_slots(params.service_id, params.date, Utc::now())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "slots": slots })))
}

/// Step 1: claim the chosen slot for this checkout session.
#[axum::debug_handler]
pub async fn create_hold(
    State(state): State<BookingCellState>,
    Json(intake): Json<BookingIntake>,
) -> Result<Json<Value>, AppError> {
    let grant = state
        .orchestrator
        .begin_booking(&intake, Utc::now())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(grant)))
}

/// "Back" from the confirm step. Releasing an unknown or expired token is
/// not an error.
#[axum::debug_handler]
pub async fn release_hold(
    State(state): State<BookingCellState>,
    Path(token): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let released = state.orchestrator.abandon(token).await;

    Ok(Json(json!({ "released": released })))
}

/// Step 3: hand in the payment proof and convert the hold. 410 on an
/// expired or consumed token tells the client to restart slot selection.
#[axum::debug_handler]
pub async fn redeem_hold(
    State(state): State<BookingCellState>,
    Path(token): Path<Uuid>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .orchestrator
        .redeem(token, &request, Utc::now())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "appointment_id": appointment.id,
        "status": appointment.status
    })))
}

/// Step 4: attach the signed consent artifact.
#[axum::debug_handler]
pub async fn attach_consent(
    State(state): State<BookingCellState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<ConsentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .orchestrator
        .attach_consent(appointment_id, &request.signature_ref)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}
