// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use scheduling_cell::services::availability::AvailabilityService;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::appointments::AppointmentDirectory;
use crate::services::attention::AttentionService;
use crate::services::payments::PaymentLedgerService;
use crate::services::transitions::AppointmentStateService;

/// The hold table and lock registry live for the whole process, so the cell
/// receives its services pre-built instead of constructing them per request.
#[derive(Clone)]
pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<AppointmentDirectory>,
    pub transitions: Arc<AppointmentStateService>,
    pub payments: Arc<PaymentLedgerService>,
    pub attention: Arc<AttentionService>,
    pub availability: Arc<AvailabilityService>,
}

pub fn appointment_routes(state: AppointmentCellState) -> Router {
    // Staff operations only; the booking flow has its own public router.
    let protected_routes = Router::new()
        .route("/", post(handlers::create_appointment))
        .route("/", get(handlers::list_appointments))
        .route("/attention", get(handlers::list_attention))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/state", patch(handlers::change_state))
        .route("/{appointment_id}/balance-payment", post(handlers::record_balance_payment))
        .route("/{appointment_id}/ledger", get(handlers::get_ledger))
        .route("/{appointment_id}/history", get(handlers::get_history))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
