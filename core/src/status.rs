//! Registration status state machine.
//!
//! ```text
//!            ┌──────► paid    (terminal)
//! pending ───┤
//!            └──────► failed  (terminal; the event id may be re-registered
//!                              in a new registration)
//! ```
//!
//! Only `pending → paid` and `pending → failed` are legal. Every other
//! transition is reported as [`IllegalTransition`] and never applied.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Payment status of a single registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Order created, payment outcome unknown
    Pending,
    /// Payment captured
    Paid,
    /// Payment failed; frees the event slot
    Failed,
}

/// Rejected status transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal registration status transition: {from} -> {to}")]
pub struct IllegalTransition {
    /// Current status
    pub from: RegistrationStatus,
    /// Requested status
    pub to: RegistrationStatus,
}

impl RegistrationStatus {
    /// `paid` or `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }

    /// Counts against the event cap (`pending` or `paid`).
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Failed)
    }

    /// Validate a transition to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] unless `self` is `pending` and `to` is terminal.
    pub const fn transition(self, to: Self) -> Result<Self, IllegalTransition> {
        match (self, to) {
            (Self::Pending, Self::Paid | Self::Failed) => Ok(to),
            (from, to) => Err(IllegalTransition { from, to }),
        }
    }

    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    /// Parse the database / wire representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
