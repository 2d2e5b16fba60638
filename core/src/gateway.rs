//! Payment gateway collaborator.
//!
//! The gateway is consumed as a black box: it creates orders and its webhook
//! signatures are checked with [`crate::webhook::verify_signature`]. The
//! HTTP client for the real provider lives in the server binary; tests use
//! the mock in `fest-testing`.

use crate::types::{EventId, Money, OrderId, Phone};
use crate::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payment gateway error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure or 5xx from the provider; safe to retry
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// Request timed out; safe to retry
    #[error("gateway timeout")]
    Timeout,

    /// Provider refused the request (bad credentials, invalid amount, ...)
    #[error("gateway rejected request: {0}")]
    Rejected(String),

    /// Provider response could not be understood
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether a retry could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// One event entry inside order notes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRegistration {
    /// Requested event
    pub event_id: EventId,
}

/// Metadata attached to an order and echoed back in the payment webhook.
///
/// Carries enough to rebuild the participant and the requested events
/// without reading the database first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotes {
    /// Participant phone (natural key)
    pub phone: Phone,
    /// Participant name
    pub name: String,
    /// College / organization
    pub college: String,
    /// Institutional id
    pub usn: String,
    /// Requested events
    pub registrations: Vec<NoteRegistration>,
}

impl OrderNotes {
    /// Event ids carried by the notes.
    #[must_use]
    pub fn event_ids(&self) -> Vec<EventId> {
        self.registrations.iter().map(|r| r.event_id.clone()).collect()
    }
}

/// Order creation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    /// Amount in minor units
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
    /// Merchant receipt reference
    pub receipt: String,
    /// Metadata echoed back by the webhook
    pub notes: OrderNotes,
}

/// Order created by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Gateway order id
    pub id: OrderId,
    /// Amount in minor units
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
}

/// Payment gateway trait
///
/// Abstraction over the payment provider.
pub trait PaymentGateway: Send + Sync {
    /// Create an order for `request.amount`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the provider does not create the order.
    fn create_order(&self, request: OrderRequest) -> BoxFuture<'_, Result<Order, GatewayError>>;

    /// Check a webhook signature over the verbatim request body.
    fn verify_signature(&self, raw_body: &[u8], signature: &str, secret: &[u8]) -> bool {
        crate::webhook::verify_signature(raw_body, signature, secret)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_notes_shape_matches_webhook_metadata() {
        let notes = OrderNotes {
            phone: Phone::new("9876543210"),
            name: "Asha".to_string(),
            college: "City College".to_string(),
            usn: "1XY21CS001".to_string(),
            registrations: vec![NoteRegistration {
                event_id: EventId::new("e1"),
            }],
        };

        let json = serde_json::to_value(&notes).unwrap();
        assert_eq!(json["phone"], "9876543210");
        assert_eq!(json["registrations"][0]["event_id"], "e1");
        assert_eq!(notes.event_ids(), vec![EventId::new("e1")]);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::Unavailable("503".into()).is_retryable());
        assert!(!GatewayError::Rejected("bad key".into()).is_retryable());
    }
}
