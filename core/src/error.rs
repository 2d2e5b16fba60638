//! Error taxonomy shared by the registration and reconciliation services.

use crate::admission::AdmissionRejection;
use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::ticket::TicketError;
use crate::types::{OrderId, Phone};
use thiserror::Error;

/// Missing or malformed client input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is absent or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A field is present but unusable.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name as the client sent it
        field: &'static str,
        /// Human-readable reason
        reason: String,
    },
}

/// Errors surfaced by the services in `fest-runtime`.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// User-correctable input problem.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Cap or duplicate-event rule refused the batch.
    #[error("{0}")]
    AdmissionRejected(#[from] AdmissionRejection),

    /// Order creation failed after retries.
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Store failure, or too many compare-and-write conflicts.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// A captured payment could not be tied to any registration.
    #[error("orphaned payment: order {order_id} for phone {phone}: {detail}")]
    OrphanedPayment {
        /// Phone from the payment metadata
        phone: Phone,
        /// Gateway order id
        order_id: OrderId,
        /// What was missing
        detail: String,
    },

    /// Ticket artifact could not be produced. Payment state is unaffected.
    #[error("ticket issuance failed: {0}")]
    TicketIssuance(#[from] TicketError),

    /// Webhook signature did not match the raw body.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Webhook body lacks required fields or is not valid JSON.
    #[error("malformed payment payload: {0}")]
    MalformedPayload(String),
}

impl ServiceError {
    /// `true` for errors caused by the caller's input.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::AdmissionRejected(_)
                | Self::InvalidSignature
                | Self::MalformedPayload(_)
        )
    }
}
