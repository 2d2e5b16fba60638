//! Domain types for participants and their registrations.
//!
//! Identifiers are newtypes around `String` so a phone number can never be
//! passed where an order id is expected. Amounts are carried in minor units
//! (paise) as [`Money`].

use crate::error::ValidationError;
use crate::status::RegistrationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a trusted value without validation.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Participant natural key. Globally unique.
    Phone
);

string_id!(
    /// Opaque reference into the external event catalog.
    EventId
);

string_id!(
    /// Payment-gateway order handle correlating a charge to a registration batch.
    OrderId
);

impl Phone {
    /// Parse a phone number from user input.
    ///
    /// Only presence is checked here (surrounding whitespace is trimmed);
    /// field-level format rules belong to the input validation layer.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] for an empty value.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField("phone"));
        }
        Ok(Self::new(trimmed))
    }
}

/// Amount of money in minor currency units (paise for INR).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Create from whole major units (rupees).
    #[must_use]
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// Value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Whole major units, truncating any fractional part.
    #[must_use]
    pub const fn major(self) -> i64 {
        self.0 / 100
    }

    /// `true` when the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// One event registration owned by a [`Participant`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Event this registration is for
    pub event_id: EventId,
    /// Gateway order that pays for this registration
    pub order_id: OrderId,
    /// Amount charged for the whole order
    pub amount: Money,
    /// Current payment status
    pub status: RegistrationStatus,
    /// Payment provider transaction id, once known
    pub provider_txn_id: Option<String>,
    /// Issued ticket artifact, once available
    pub ticket_url: Option<String>,
    /// When the registration was created
    pub registered_at: DateTime<Utc>,
}

impl Registration {
    /// New `pending` registration for one event of an order.
    #[must_use]
    pub const fn pending(
        event_id: EventId,
        order_id: OrderId,
        amount: Money,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            order_id,
            amount,
            status: RegistrationStatus::Pending,
            provider_txn_id: None,
            ticket_url: None,
            registered_at,
        }
    }

    /// `pending` or `paid`.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Paid but still waiting for its ticket artifact.
    #[must_use]
    pub const fn awaits_ticket(&self) -> bool {
        matches!(self.status, RegistrationStatus::Paid) && self.ticket_url.is_none()
    }
}

/// A fest participant keyed by phone number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Natural key
    pub phone: Phone,
    /// Display name
    pub name: String,
    /// Institutional id (university serial number)
    pub institutional_id: String,
    /// College or organization
    pub organization: String,
    /// When the participant record was first created
    pub created_at: DateTime<Utc>,
    /// All registrations, including failed ones kept for audit
    pub registrations: Vec<Registration>,
}

impl Participant {
    /// New participant without registrations.
    #[must_use]
    pub const fn new(
        phone: Phone,
        name: String,
        institutional_id: String,
        organization: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            phone,
            name,
            institutional_id,
            organization,
            created_at,
            registrations: Vec::new(),
        }
    }

    /// Registrations whose status is not `failed`.
    pub fn active_registrations(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.iter().filter(|r| r.is_active())
    }

    /// Registrations that belong to the given order.
    pub fn registrations_for_order<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> impl Iterator<Item = &'a Registration> + 'a {
        self.registrations
            .iter()
            .filter(move |r| &r.order_id == order_id)
    }

    /// The active registration for an event, if any.
    #[must_use]
    pub fn active_registration_for(&self, event_id: &EventId) -> Option<&Registration> {
        self.active_registrations().find(|r| &r.event_id == event_id)
    }

    /// Event ids held by more than one active registration.
    ///
    /// Always empty for a consistent record.
    #[must_use]
    pub fn duplicate_active_events(&self) -> Vec<EventId> {
        let mut seen = std::collections::BTreeSet::new();
        let mut duplicates = std::collections::BTreeSet::new();
        for registration in self.active_registrations() {
            if !seen.insert(&registration.event_id) {
                duplicates.insert(registration.event_id.clone());
            }
        }
        duplicates.into_iter().collect()
    }

    /// The paid registration for an event, if any.
    #[must_use]
    pub fn paid_registration_for(&self, event_id: &EventId) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|r| &r.event_id == event_id && r.status == RegistrationStatus::Paid)
    }
}

/// Participant fields as submitted by a client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInput {
    /// Display name
    pub name: String,
    /// Institutional id
    pub institutional_id: String,
    /// Phone number (natural key)
    pub phone: String,
    /// College or organization
    pub organization: String,
}

impl ParticipantInput {
    /// Check that every required field is present.
    ///
    /// Returns the parsed phone on success.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] naming the first empty field.
    pub fn validate(&self) -> Result<Phone, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.institutional_id.trim().is_empty() {
            return Err(ValidationError::MissingField("usn"));
        }
        if self.organization.trim().is_empty() {
            return Err(ValidationError::MissingField("college"));
        }
        Phone::parse(&self.phone)
    }

    /// Build a fresh participant record from this input.
    #[must_use]
    pub fn into_participant(self, phone: Phone, created_at: DateTime<Utc>) -> Participant {
        Participant::new(
            phone,
            self.name.trim().to_string(),
            self.institutional_id.trim().to_string(),
            self.organization.trim().to_string(),
            created_at,
        )
    }
}
