//! Route table.

use crate::handlers::{
    get_participant, health_check, payment_webhook, submit_registration, verify_entry,
};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

/// Build the application router with correlation-id tracking and permissive CORS.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/registration", post(submit_registration))
        .route("/payment-webhook", post(payment_webhook))
        .route("/participants/:phone", get(get_participant))
        .route("/verify/:phone/:event_id", get(verify_entry))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(correlation_id_layer())
        .with_state(state)
}
