//! Participant lookup and entry verification.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use fest_core::types::{EventId, Participant, Phone, Registration};

/// `GET /participants/:phone`
///
/// # Errors
///
/// - 404 when no participant has this phone
/// - 500 on store failure
pub async fn get_participant(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Json<Participant>, AppError> {
    let phone = Phone::new(phone.trim());
    let participant = state
        .directory
        .get(&phone)
        .await?
        .ok_or_else(|| AppError::not_found("Participant", &phone))?;
    Ok(Json(participant))
}

/// `GET /verify/:phone/:event_id`
///
/// Answers with the paid registration that admits the participant.
///
/// # Errors
///
/// - 404 when there is no paid registration for the event
/// - 500 on store failure
pub async fn verify_entry(
    State(state): State<AppState>,
    Path((phone, event_id)): Path<(String, String)>,
) -> Result<Json<Registration>, AppError> {
    let phone = Phone::new(phone.trim());
    let event_id = EventId::new(event_id.trim());
    let registration = state
        .directory
        .verify(&phone, &event_id)
        .await?
        .ok_or_else(|| AppError::not_found("Paid registration", format!("{phone}/{event_id}")))?;
    Ok(Json(registration))
}
