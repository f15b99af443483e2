use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde_json::json;

use appointment_cell::router::{appointment_routes, AppointmentCellState};
use appointment_cell::services::appointments::AppointmentDirectory;
use appointment_cell::services::attention::AttentionService;
use appointment_cell::services::notify::NotificationService;
use appointment_cell::services::payments::PaymentLedgerService;
use appointment_cell::services::transitions::AppointmentStateService;
use booking_cell::router::{booking_routes, BookingCellState};
use booking_cell::services::orchestrator::BookingOrchestrator;
use scheduling_cell::services::availability::AvailabilityService;
use scheduling_cell::services::holds::SlotHoldService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

const HOLD_SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub fn create_router(config: Arc<AppConfig>) -> Router {
    let supabase = Arc::new(SupabaseClient::new(&config));

    // The hold table and per-appointment locks are process-wide; every
    // router shares these instances.
    let holds = Arc::new(SlotHoldService::new(Arc::clone(&supabase)));
    holds.spawn_sweeper(HOLD_SWEEP_PERIOD);

    let availability = Arc::new(AvailabilityService::new(
        Arc::clone(&supabase),
        Arc::clone(&holds),
    ));
    let directory = Arc::new(AppointmentDirectory::new(
        Arc::clone(&supabase),
        Arc::clone(&holds),
        Arc::clone(&availability),
    ));
    let payments = Arc::new(PaymentLedgerService::new(Arc::clone(&supabase)));
    let notifier = Arc::new(NotificationService::new(&config));
    let transitions = Arc::new(AppointmentStateService::new(
        Arc::clone(&supabase),
        Arc::clone(&directory),
        Arc::clone(&payments),
        notifier,
    ));
    let attention = Arc::new(AttentionService::new(
        Arc::clone(&directory),
        Arc::clone(&payments),
    ));
    let orchestrator = Arc::new(BookingOrchestrator::new(
        Arc::clone(&holds),
        Arc::clone(&availability),
        Arc::clone(&directory),
        Arc::clone(&payments),
    ));

    let appointment_state = AppointmentCellState {
        config: Arc::clone(&config),
        directory,
        transitions,
        payments,
        attention,
        availability,
    };
    let booking_state = BookingCellState { orchestrator };

    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .route("/health", get(health))
        .nest("/api/booking", booking_routes(booking_state))
        .nest("/api/appointments", appointment_routes(appointment_state))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
