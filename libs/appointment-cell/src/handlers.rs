// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentStatus, BalancePaymentRequest, ChangeStateRequest,
    CreateAppointmentRequest,
};
use crate::router::AppointmentCellState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct DayQueryParams {
    pub date: NaiveDate,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AttentionQueryParams {
    pub date: Option<NaiveDate>,
    pub doctor_id: Option<Uuid>,
}

fn actor_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid subject in token".to_string()))
}

fn to_app_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::LedgerNotFound => {
            AppError::NotFound("No payment ledger for this appointment".to_string())
        }
        AppointmentError::InvalidTransition { .. }
        | AppointmentError::StaleStatus
        | AppointmentError::SlotTaken
        | AppointmentError::DepositAlreadyRecorded => AppError::Conflict(e.to_string()),
        AppointmentError::DepositRequired
        | AppointmentError::NotSameDay
        | AppointmentError::BalanceNotSettled { .. }
        | AppointmentError::OverpaymentRejected { .. } => {
            AppError::UnprocessableEntity(e.to_string())
        }
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// STAFF APPOINTMENT HANDLERS
// ==============================================================================

/// Direct entry by staff: pending, or confirmed with its deposit recorded in
/// the same request.
#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentCellState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_id(&user)?;
    let now = Utc::now();

    let initial_status = request
        .initial_status
        .clone()
        .unwrap_or(AppointmentStatus::Pending);
    if !matches!(
        initial_status,
        AppointmentStatus::Pending | AppointmentStatus::Confirmed
    ) {
        return Err(AppError::BadRequest(
            "Appointments can only be entered as pending or confirmed".to_string(),
        ));
    }
    if initial_status == AppointmentStatus::Confirmed && request.deposit_method.is_none() {
        return Err(AppError::BadRequest(
            "Confirmed entry requires a deposit method".to_string(),
        ));
    }

    let service = state
        .availability
        .service(request.service_id)
        .await
        .map_err(|e| to_app_error(e.into()))?;

    let mut appointment = state
        .directory
        .create_direct(&request, actor, now)
        .await
        .map_err(to_app_error)?;

    if let Some(method) = request.deposit_method.clone() {
        state
            .payments
            .record_deposit(
                appointment.id,
                service.price_cents,
                service.deposit_cents(),
                method,
                now,
            )
            .await
            .map_err(to_app_error)?;
    }

    if initial_status == AppointmentStatus::Confirmed {
        appointment = state
            .transitions
            .change_status(appointment.id, AppointmentStatus::Confirmed, actor, None, now)
            .await
            .map_err(to_app_error)?;
    }

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .directory
        .get(appointment_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentCellState>,
    Query(params): Query<DayQueryParams>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .directory
        .list_for_day(params.date, params.doctor_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

/// The guarded transition endpoint; the actor comes from the validated
/// token, never from the request body.
#[axum::debug_handler]
pub async fn change_state(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<ChangeStateRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_id(&user)?;

    let appointment = state
        .transitions
        .change_status(
            appointment_id,
            request.target_status,
            actor,
            request.reason,
            Utc::now(),
        )
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn record_balance_payment(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
    Extension(_user): Extension<User>,
    Json(request): Json<BalancePaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let ledger = state
        .payments
        .record_balance_payment(
            appointment_id,
            request.amount_cents,
            request.method,
            request.proof_ref,
            Utc::now(),
        )
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "ledger": ledger
    })))
}

#[axum::debug_handler]
pub async fn get_ledger(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let ledger = state
        .payments
        .ledger_view(appointment_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(ledger)))
}

#[axum::debug_handler]
pub async fn get_history(
    State(state): State<AppointmentCellState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    // Surface a 404 for unknown ids rather than an empty log.
    state
        .directory
        .get(appointment_id)
        .await
        .map_err(to_app_error)?;

    let history = state
        .transitions
        .transition_history(appointment_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "history": history })))
}

#[axum::debug_handler]
pub async fn list_attention(
    State(state): State<AppointmentCellState>,
    Query(params): Query<AttentionQueryParams>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let date = params.date.unwrap_or_else(|| now.date_naive());

    let entries = state
        .attention
        .attention_for_day(date, params.doctor_id, now)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "attention": entries })))
}
