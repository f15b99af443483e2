// libs/booking-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::services::orchestrator::BookingOrchestrator;

#[derive(Clone)]
pub struct BookingCellState {
    pub orchestrator: Arc<BookingOrchestrator>,
}

/// The public, unauthenticated booking flow. Slot contention is handled by
/// the hold manager, not by auth.
pub fn booking_routes(state: BookingCellState) -> Router {
    Router::new()
        .route("/slots", get(handlers::get_available_slots))
        .route("/holds", post(handlers::create_hold))
        .route("/holds/{token}", delete(handlers::release_hold))
        .route("/holds/{token}/redeem", post(handlers::redeem_hold))
        .route("/appointments/{appointment_id}/consent", post(handlers::attach_consent))
        .with_state(state)
}
