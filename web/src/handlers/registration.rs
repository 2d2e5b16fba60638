//! `POST /registration`: admit a batch and open a payment order.

use crate::error::AppError;
use crate::extractors::CorrelationId;
use crate::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use fest_core::types::{EventId, Money, ParticipantInput};
use fest_runtime::OrderConfirmation;
use serde::Deserialize;

/// One selected event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSelection {
    /// Event identifier
    pub event_id: String,
}

/// Registration form as submitted by the client.
///
/// Missing profile fields deserialize as empty so the service can name the
/// first one in its validation error.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    /// Participant name
    #[serde(default)]
    pub name: String,
    /// University seat number (institutional id)
    #[serde(default)]
    pub usn: String,
    /// Phone number
    #[serde(default)]
    pub phone: String,
    /// College
    #[serde(default)]
    pub college: String,
    /// Selected events
    #[serde(default)]
    pub registrations: Vec<EventSelection>,
    /// Total amount in rupees
    pub amount: f64,
}

impl RegistrationRequest {
    fn into_parts(self) -> Result<(ParticipantInput, Vec<EventId>, Money), AppError> {
        let amount = rupees_to_minor(self.amount)?;
        let events = self
            .registrations
            .into_iter()
            .map(|selection| EventId::new(selection.event_id.trim()))
            .collect();
        let input = ParticipantInput {
            name: self.name,
            institutional_id: self.usn,
            phone: self.phone,
            organization: self.college,
        };
        Ok((input, events, amount))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn rupees_to_minor(amount: f64) -> Result<Money, AppError> {
    // i64 holds far more paise than any order amount
    if !amount.is_finite() || amount > 1e12 {
        return Err(AppError::validation("invalid amount"));
    }
    Ok(Money::from_minor((amount * 100.0).round() as i64))
}

/// Submit a registration batch.
///
/// ```text
/// POST /registration
/// {"name", "usn", "phone", "college", "registrations": [{"event_id"}], "amount"}
/// ```
///
/// Returns `{order_id, amount, currency}` with `amount` in paise.
///
/// # Errors
///
/// - 400 for unreadable JSON, validation failures and admission rejections
/// - 500 when the order cannot be created or persisted
pub async fn submit_registration(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<Json<OrderConfirmation>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let (input, events, amount) = request.into_parts()?;

    tracing::debug!(
        correlation_id = %correlation_id.0,
        events = events.len(),
        %amount,
        "Registration submitted"
    );

    let confirmation = state.registration.submit(input, events, amount).await?;
    Ok(Json(confirmation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rupees_are_converted_to_paise() {
        assert_eq!(rupees_to_minor(150.0).ok(), Some(Money::from_minor(15_000)));
        assert_eq!(rupees_to_minor(99.99).ok(), Some(Money::from_minor(9_999)));
        assert!(rupees_to_minor(f64::NAN).is_err());
        assert!(rupees_to_minor(f64::INFINITY).is_err());
    }
}
