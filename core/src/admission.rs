//! Admission control for registration batches.
//!
//! [`AdmissionController::evaluate`] is a pure function over a point-in-time
//! snapshot. It is advisory on its own: the services re-run it against every
//! fresh snapshot they read, and the store's compare-and-write rejects a
//! commit whose snapshot went stale, so two concurrent batches can never both
//! pass against the same pre-write state.
//!
//! Checks run in this order:
//!
//! 1. the batch is not empty
//! 2. the batch does not repeat an event
//! 3. active + requested stays within the cap
//! 4. no requested event already has an active registration

use crate::types::{EventId, Registration};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Why a batch was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AdmissionRejection {
    /// The batch contained no events.
    #[error("no events requested")]
    NoEventsRequested,

    /// The same event appears more than once in the batch.
    #[error("the same event cannot be selected twice: {}", join(.event_ids))]
    DuplicateSelection {
        /// Repeated event ids
        event_ids: Vec<EventId>,
    },

    /// The participant would exceed the per-participant cap.
    #[error(
        "you already used your event slots: a participant can register for at most {max_events} events ({active} active, {requested} requested)"
    )]
    CapExceeded {
        /// Configured cap
        max_events: usize,
        /// Active registrations already held
        active: usize,
        /// Size of the refused batch
        requested: usize,
    },

    /// The participant already holds an active registration for these events.
    #[error("you already registered for event {}", join(.event_ids))]
    DuplicateEvent {
        /// Conflicting event ids
        event_ids: Vec<EventId>,
    },
}

impl AdmissionRejection {
    /// Stable machine-readable code for API clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoEventsRequested => "NO_EVENTS_REQUESTED",
            Self::DuplicateSelection { .. } => "DUPLICATE_SELECTION",
            Self::CapExceeded { .. } => "EVENT_CAP_REACHED",
            Self::DuplicateEvent { .. } => "DUPLICATE_EVENT",
        }
    }
}

fn join(ids: &[EventId]) -> String {
    ids.iter()
        .map(EventId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The batch may be registered.
    Accept,
    /// The batch must be refused.
    Reject(AdmissionRejection),
}

impl Decision {
    /// Convert into a `Result` for `?` propagation.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason for [`Decision::Reject`].
    pub fn into_result(self) -> Result<(), AdmissionRejection> {
        match self {
            Self::Accept => Ok(()),
            Self::Reject(reason) => Err(reason),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => f.write_str("accept"),
            Self::Reject(reason) => write!(f, "reject: {reason}"),
        }
    }
}

/// Enforces the per-participant event cap and the no-duplicate-event rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionController {
    max_events: usize,
}

impl AdmissionController {
    /// Controller with the given cap.
    #[must_use]
    pub const fn new(max_events: usize) -> Self {
        Self { max_events }
    }

    /// Configured cap.
    #[must_use]
    pub const fn max_events(&self) -> usize {
        self.max_events
    }

    /// Decide whether `proposed` may be added next to `existing`.
    ///
    /// `existing` may contain failed registrations; only active ones count.
    #[must_use]
    pub fn evaluate(&self, existing: &[Registration], proposed: &[EventId]) -> Decision {
        if proposed.is_empty() {
            return Decision::Reject(AdmissionRejection::NoEventsRequested);
        }

        let mut seen = BTreeSet::new();
        let mut repeated = BTreeSet::new();
        for event_id in proposed {
            if !seen.insert(event_id) {
                repeated.insert(event_id.clone());
            }
        }
        if !repeated.is_empty() {
            return Decision::Reject(AdmissionRejection::DuplicateSelection {
                event_ids: repeated.into_iter().collect(),
            });
        }

        let active: BTreeSet<&EventId> = existing
            .iter()
            .filter(|r| r.is_active())
            .map(|r| &r.event_id)
            .collect();
        let active_count = existing.iter().filter(|r| r.is_active()).count();

        if active_count >= self.max_events || active_count + proposed.len() > self.max_events {
            return Decision::Reject(AdmissionRejection::CapExceeded {
                max_events: self.max_events,
                active: active_count,
                requested: proposed.len(),
            });
        }

        let conflicts: Vec<EventId> = proposed
            .iter()
            .filter(|id| active.contains(id))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Decision::Reject(AdmissionRejection::DuplicateEvent { event_ids: conflicts });
        }

        Decision::Accept
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::status::RegistrationStatus;
    use crate::types::{Money, OrderId};
    use chrono::Utc;
    use proptest::prelude::*;

    fn registration(event: &str, status: RegistrationStatus) -> Registration {
        let mut r = Registration::pending(
            EventId::new(event),
            OrderId::new("order_1"),
            Money::from_major(100),
            Utc::now(),
        );
        r.status = status;
        r
    }

    fn ids(raw: &[&str]) -> Vec<EventId> {
        raw.iter().map(|s| EventId::new(*s)).collect()
    }

    #[test]
    fn test_accepts_fresh_participant() {
        let controller = AdmissionController::new(4);
        assert_eq!(controller.evaluate(&[], &ids(&["e1", "e2"])), Decision::Accept);
    }

    #[test]
    fn test_rejects_empty_batch() {
        let controller = AdmissionController::new(4);
        assert_eq!(
            controller.evaluate(&[], &[]),
            Decision::Reject(AdmissionRejection::NoEventsRequested)
        );
    }

    #[test]
    fn test_rejects_duplicate_selection() {
        let controller = AdmissionController::new(4);
        let decision = controller.evaluate(&[], &ids(&["e1", "e2", "e1"]));
        assert_eq!(
            decision,
            Decision::Reject(AdmissionRejection::DuplicateSelection {
                event_ids: ids(&["e1"])
            })
        );
    }

    #[test]
    fn test_rejects_fifth_event_mentioning_cap() {
        let controller = AdmissionController::new(4);
        let existing: Vec<_> = ["e1", "e2", "e3", "e4"]
            .iter()
            .map(|e| registration(e, RegistrationStatus::Paid))
            .collect();

        let reason = controller
            .evaluate(&existing, &ids(&["e5"]))
            .into_result()
            .unwrap_err();

        assert_eq!(reason.code(), "EVENT_CAP_REACHED");
        assert!(reason.to_string().contains("at most 4 events"));
    }

    #[test]
    fn test_rejects_batch_that_would_overflow_cap() {
        let controller = AdmissionController::new(4);
        let existing: Vec<_> = ["e1", "e2", "e3"]
            .iter()
            .map(|e| registration(e, RegistrationStatus::Pending))
            .collect();

        assert!(matches!(
            controller.evaluate(&existing, &ids(&["e4", "e5"])),
            Decision::Reject(AdmissionRejection::CapExceeded { active: 3, requested: 2, .. })
        ));
    }

    #[test]
    fn test_failed_registrations_free_their_slot() {
        let controller = AdmissionController::new(4);
        let existing = vec![
            registration("e1", RegistrationStatus::Failed),
            registration("e2", RegistrationStatus::Failed),
            registration("e3", RegistrationStatus::Paid),
            registration("e4", RegistrationStatus::Paid),
            registration("e5", RegistrationStatus::Pending),
        ];
        assert_eq!(controller.evaluate(&existing, &ids(&["e1"])), Decision::Accept);
    }

    #[test]
    fn test_rejects_already_registered_event() {
        let controller = AdmissionController::new(4);
        let existing = vec![registration("e2", RegistrationStatus::Pending)];

        let reason = controller
            .evaluate(&existing, &ids(&["e1", "e2"]))
            .into_result()
            .unwrap_err();

        assert_eq!(
            reason,
            AdmissionRejection::DuplicateEvent { event_ids: ids(&["e2"]) }
        );
        assert_eq!(reason.to_string(), "you already registered for event e2");
    }

    fn any_existing() -> impl Strategy<Value = Vec<Registration>> {
        prop::collection::vec(
            (
                0u8..8,
                prop_oneof![
                    Just(RegistrationStatus::Pending),
                    Just(RegistrationStatus::Paid),
                    Just(RegistrationStatus::Failed),
                ],
            ),
            0..8,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(e, s)| registration(&format!("e{e}"), s))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_accepted_batches_preserve_invariants(
            existing in any_existing(),
            proposed in prop::collection::vec(0u8..8, 0..6),
            cap in 1usize..6,
        ) {
            let controller = AdmissionController::new(cap);
            let proposed: Vec<EventId> = proposed.iter().map(|e| EventId::new(format!("e{e}"))).collect();

            if controller.evaluate(&existing, &proposed) == Decision::Accept {
                let active: Vec<&EventId> = existing
                    .iter()
                    .filter(|r| r.is_active())
                    .map(|r| &r.event_id)
                    .chain(proposed.iter())
                    .collect();
                prop_assert!(active.len() <= cap);

                let unique: BTreeSet<&EventId> = proposed.iter().collect();
                prop_assert_eq!(unique.len(), proposed.len());
                for id in &proposed {
                    prop_assert!(!existing.iter().any(|r| r.is_active() && &r.event_id == id));
                }
            }
        }
    }
}
