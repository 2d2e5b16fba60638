//! Test data builders.

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

use crate::mocks::test_clock;
use fest_core::environment::Clock;
use fest_core::status::RegistrationStatus;
use fest_core::types::{EventId, Money, OrderId, Participant, ParticipantInput, Phone, Registration};
use fest_core::webhook::compute_signature;
use serde_json::{Value, json};

/// Webhook secret shared by the fixtures and the services under test.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

/// Complete client input for `phone`.
#[must_use]
pub fn participant_input(phone: &str) -> ParticipantInput {
    ParticipantInput {
        name: "Asha Rao".to_string(),
        institutional_id: "1XY21CS001".to_string(),
        phone: phone.to_string(),
        organization: "City College".to_string(),
    }
}

/// Participant without registrations.
#[must_use]
pub fn participant(phone: &str) -> Participant {
    participant_input(phone).into_participant(Phone::new(phone), test_clock().now())
}

/// `pending` registration of 100.00 for one event.
#[must_use]
pub fn pending(event: &str, order: &str) -> Registration {
    Registration::pending(
        EventId::new(event),
        OrderId::new(order),
        Money::from_major(100),
        test_clock().now(),
    )
}

/// Registration in `status` for one event.
#[must_use]
pub fn registration(event: &str, order: &str, status: RegistrationStatus) -> Registration {
    let mut registration = pending(event, order);
    registration.status = status;
    registration
}

/// Event ids from string slices.
#[must_use]
pub fn event_ids(ids: &[&str]) -> Vec<EventId> {
    ids.iter().map(|id| EventId::new(*id)).collect()
}

/// Sign `body` with [`TEST_WEBHOOK_SECRET`].
#[must_use]
pub fn sign(body: &[u8]) -> String {
    compute_signature(body, TEST_WEBHOOK_SECRET.as_bytes()).unwrap()
}

/// Builder for provider-shaped payment webhook bodies.
///
/// # Example
///
/// ```
/// use fest_testing::fixtures::{WebhookBuilder, sign};
///
/// let body = WebhookBuilder::captured("order_1", "9876543210")
///     .events(&["e1", "e2"])
///     .build();
/// let signature = sign(&body);
/// assert_eq!(signature.len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct WebhookBuilder {
    order_id: String,
    phone: String,
    status: String,
    payment_id: String,
    amount: Money,
    events: Vec<String>,
    profile: bool,
}

impl WebhookBuilder {
    /// Event for `order_id` with an arbitrary provider status.
    #[must_use]
    pub fn new(order_id: &str, phone: &str, status: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            phone: phone.to_string(),
            status: status.to_string(),
            payment_id: format!("pay_{order_id}"),
            amount: Money::from_major(100),
            events: Vec::new(),
            profile: true,
        }
    }

    /// `payment.captured` event.
    #[must_use]
    pub fn captured(order_id: &str, phone: &str) -> Self {
        Self::new(order_id, phone, "captured")
    }

    /// `payment.failed` event.
    #[must_use]
    pub fn failed(order_id: &str, phone: &str) -> Self {
        Self::new(order_id, phone, "failed")
    }

    /// Provider payment id.
    #[must_use]
    pub fn payment_id(mut self, payment_id: &str) -> Self {
        self.payment_id = payment_id.to_string();
        self
    }

    /// Amount in the event.
    #[must_use]
    pub const fn amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    /// Event ids carried in the notes.
    #[must_use]
    pub fn events(mut self, events: &[&str]) -> Self {
        self.events = events.iter().map(ToString::to_string).collect();
        self
    }

    /// Drop name, college and usn from the notes.
    #[must_use]
    pub const fn without_profile(mut self) -> Self {
        self.profile = false;
        self
    }

    /// JSON value of the body.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut notes = json!({
            "phone": self.phone,
            "registrations": self.events.iter().map(|e| json!({ "event_id": e })).collect::<Vec<_>>(),
        });
        if self.profile {
            notes["name"] = json!("Asha Rao");
            notes["college"] = json!("City College");
            notes["usn"] = json!("1XY21CS001");
        }

        json!({
            "entity": "event",
            "event": format!("payment.{}", self.status),
            "payload": { "payment": { "entity": {
                "id": self.payment_id,
                "order_id": self.order_id,
                "amount": self.amount.minor(),
                "currency": "INR",
                "status": self.status,
                "notes": notes,
            }}}
        })
    }

    /// Serialized body.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_json()).unwrap()
    }
}
