//! `POST /payment-webhook`: authenticate and accept a payment event.
//!
//! The signature and payload are checked before responding; the state
//! change runs on the tracked [`crate::tasks::WebhookTasks`] set so the
//! provider is acknowledged promptly and shutdown can wait for it.
//! Redelivery is harmless, so failures after acceptance are logged rather
//! than reported back to the provider.

use crate::error::AppError;
use crate::extractors::CorrelationId;
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use fest_core::error::ServiceError;
pub use fest_core::webhook::SIGNATURE_HEADER;
use fest_runtime::ReconcileOutcome;
use serde_json::{Value, json};
use tracing::Instrument;

/// Accept a signed payment webhook.
///
/// # Errors
///
/// - 400 `INVALID_SIGNATURE` when the header is missing or does not match
/// - 400 `MALFORMED_PAYLOAD` when the body is not a usable payment event
pub async fn payment_webhook(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::InvalidSignature)?;

    let event = state.reconciler.verify(&body, signature)?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        order_id = %event.order_id,
        event_type = event.event_type.as_deref().unwrap_or("unknown"),
        "Payment webhook accepted"
    );

    let reconciler = state.reconciler.clone();
    state.tasks.spawn(
        async move {
            match reconciler.apply(event).await {
                Ok(ReconcileOutcome::Applied { status, registrations, ticket }) => {
                    tracing::info!(%status, registrations, ?ticket, "Payment webhook processed");
                },
                Ok(outcome) => tracing::debug!(?outcome, "Payment webhook produced no change"),
                Err(err) => tracing::error!(error = %err, "Payment webhook processing failed"),
            }
        }
        .in_current_span(),
    );

    Ok(Json(json!({ "status": "accepted" })))
}
