//! Payment webhook authentication and parsing.
//!
//! The provider signs the raw request body with HMAC-SHA256 using the shared
//! webhook secret and sends the lowercase hex digest in the
//! `X-Razorpay-Signature` header. Verification always runs over the verbatim
//! bytes received, never over a re-serialized copy, and must succeed before
//! the body is parsed.
//!
//! Body shape:
//!
//! ```text
//! {
//!   "event": "payment.captured",
//!   "payload": { "payment": { "entity": {
//!     "id": "pay_...", "order_id": "order_...", "amount": 15000,
//!     "currency": "INR", "status": "captured",
//!     "notes": { "phone": "...", "name": "...", "college": "...", "usn": "...",
//!                "registrations": [ { "event_id": "..." } ] }
//!   } } }
//! }
//! ```

use crate::error::ValidationError;
use crate::status::RegistrationStatus;
use crate::types::{EventId, Money, OrderId, Participant, Phone};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Computes the lowercase hex HMAC-SHA256 of `payload`.
///
/// Returns `None` only if the MAC cannot be keyed, which HMAC never refuses.
#[must_use]
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a webhook signature against the raw payload and secret.
///
/// The supplied signature is compared byte for byte (in constant time)
/// against the digest computed over `payload`.
///
/// # Examples
///
/// ```
/// use fest_core::webhook::{compute_signature, verify_signature};
///
/// let body = br#"{"event":"payment.captured"}"#;
/// let signature = compute_signature(body, b"secret").unwrap_or_default();
///
/// assert!(verify_signature(body, &signature, b"secret"));
/// assert!(!verify_signature(body, &signature, b"other-secret"));
/// ```
#[must_use]
pub fn verify_signature(payload: &[u8], signature: &str, secret: &[u8]) -> bool {
    if signature.is_empty() {
        return false;
    }
    compute_signature(payload, secret).is_some_and(|expected| {
        constant_time_eq::constant_time_eq(expected.as_bytes(), signature.as_bytes())
    })
}

/// Payment status reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    /// Money captured
    Captured,
    /// Payment failed
    Failed,
    /// Any intermediate status (`authorized`, `created`, ...)
    Other(String),
}

impl ProviderStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "captured" => Self::Captured,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Registration status this payment status resolves to.
    ///
    /// `None` for intermediate statuses, which are not an outcome.
    #[must_use]
    pub const fn outcome(&self) -> Option<RegistrationStatus> {
        match self {
            Self::Captured => Some(RegistrationStatus::Paid),
            Self::Failed => Some(RegistrationStatus::Failed),
            Self::Other(_) => None,
        }
    }
}

/// Participant and event data echoed back from the order notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMetadata {
    /// Participant phone
    pub phone: Phone,
    /// Participant name
    pub name: Option<String>,
    /// College / organization
    pub organization: Option<String>,
    /// Institutional id
    pub institutional_id: Option<String>,
    /// Events the order was created for
    pub event_ids: Vec<EventId>,
}

impl PaymentMetadata {
    /// Build a participant record from the metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] when a profile field is absent.
    pub fn new_participant(&self, created_at: DateTime<Utc>) -> Result<Participant, ValidationError> {
        let name = self.name.clone().ok_or(ValidationError::MissingField("name"))?;
        let organization = self
            .organization
            .clone()
            .ok_or(ValidationError::MissingField("college"))?;
        let institutional_id = self
            .institutional_id
            .clone()
            .ok_or(ValidationError::MissingField("usn"))?;
        Ok(Participant::new(
            self.phone.clone(),
            name,
            institutional_id,
            organization,
            created_at,
        ))
    }
}

/// A parsed payment status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    /// Provider event name, e.g. `payment.captured`
    pub event_type: Option<String>,
    /// Gateway order id
    pub order_id: OrderId,
    /// Provider transaction (payment) id
    pub provider_txn_id: String,
    /// Provider payment status
    pub status: ProviderStatus,
    /// Amount in minor units
    pub amount: Money,
    /// ISO currency code
    pub currency: Option<String>,
    /// Order notes
    pub metadata: PaymentMetadata,
}

/// Why a webhook body could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Body is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// A required field is absent.
    #[error("missing field {0}")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct Envelope {
    event: Option<String>,
    payload: Option<EnvelopePayload>,
}

#[derive(Deserialize)]
struct EnvelopePayload {
    payment: Option<PaymentWrapper>,
}

#[derive(Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: Option<String>,
    order_id: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    status: Option<String>,
    #[serde(default)]
    notes: Value,
}

/// Parse a verified webhook body.
///
/// # Errors
///
/// Returns [`PayloadError`] for invalid JSON or when the order id, payment
/// id, status, amount or notes phone is missing.
pub fn parse_payment_event(raw: &[u8]) -> Result<PaymentEvent, PayloadError> {
    let envelope: Envelope =
        serde_json::from_slice(raw).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;

    let entity = envelope
        .payload
        .and_then(|p| p.payment)
        .map(|p| p.entity)
        .ok_or(PayloadError::MissingField("payload.payment.entity"))?;

    let order_id = non_empty(entity.order_id).ok_or(PayloadError::MissingField("order_id"))?;
    let provider_txn_id = non_empty(entity.id).ok_or(PayloadError::MissingField("id"))?;
    let status = non_empty(entity.status).ok_or(PayloadError::MissingField("status"))?;
    let amount = entity.amount.ok_or(PayloadError::MissingField("amount"))?;

    let empty = Map::new();
    let notes = entity.notes.as_object().unwrap_or(&empty);
    let phone = note_string(notes, "phone")
        .and_then(|raw| Phone::parse(&raw).ok())
        .ok_or(PayloadError::MissingField("notes.phone"))?;

    Ok(PaymentEvent {
        event_type: envelope.event,
        order_id: OrderId::new(order_id),
        provider_txn_id,
        status: ProviderStatus::parse(&status),
        amount: Money::from_minor(amount),
        currency: entity.currency,
        metadata: PaymentMetadata {
            phone,
            name: note_string(notes, "name"),
            organization: note_string(notes, "college"),
            institutional_id: note_string(notes, "usn"),
            event_ids: note_event_ids(notes.get("registrations")),
        },
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn note_string(notes: &Map<String, Value>, key: &str) -> Option<String> {
    match notes.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Registrations arrive as an array of `{event_id}` objects, an array of ids,
/// or (since providers flatten note values to strings) a JSON-encoded string
/// of either.
fn note_event_ids(value: Option<&Value>) -> Vec<EventId> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(EventId::new(id.as_str())),
                Value::Object(obj) => match obj.get("event_id") {
                    Some(Value::String(id)) => Some(EventId::new(id.as_str())),
                    _ => None,
                },
                _ => None,
            })
            .collect(),
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
            .map(|decoded| note_event_ids(Some(&decoded)))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
