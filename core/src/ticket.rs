//! Ticket issuer collaborator.
//!
//! Rendering and blob storage are outside this system. Implementations
//! turn a [`TicketRequest`] into a durable URL or fail.

use crate::types::{Money, OrderId, Phone};
use crate::BoxFuture;
use serde::Serialize;
use thiserror::Error;

/// Ticket issuance error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    /// Issuer unreachable or overloaded; safe to retry
    #[error("ticket issuer unavailable: {0}")]
    Unavailable(String),

    /// Artifact could not be produced
    #[error("ticket rendering failed: {0}")]
    Failed(String),
}

impl TicketError {
    /// Whether a retry could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Everything the issuer needs to render one ticket for one order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TicketRequest {
    /// Participant identity (natural key)
    pub participant_id: Phone,
    /// Name printed on the ticket
    pub name: String,
    /// Phone printed on the ticket
    pub phone: Phone,
    /// Price paid for the order
    pub price: Money,
    /// Number of events covered by the order
    pub event_count: usize,
    /// Order the ticket belongs to
    pub order_id: OrderId,
}

/// Produces ticket artifacts.
pub trait TicketIssuer: Send + Sync {
    /// Issue a ticket and return its URL.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError`] when no artifact was stored.
    fn issue(&self, request: TicketRequest) -> BoxFuture<'_, Result<String, TicketError>>;
}
