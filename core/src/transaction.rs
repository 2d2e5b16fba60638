//! Staged mutations against a participant snapshot.
//!
//! A [`ParticipantTransaction`] is opened from the snapshot a service just
//! read. Every mutation is applied to the in-memory copy only; nothing
//! reaches the store until [`ParticipantTransaction::commit`] performs the
//! compare-and-write. Dropping the transaction (or calling
//! [`ParticipantTransaction::abort`]) discards the staged changes.
//!
//! Invariants enforced at staging time:
//!
//! - appended batches pass the [`AdmissionController`] against the snapshot
//! - status changes follow the state machine in [`crate::status`]; illegal
//!   transitions are reported in [`StatusUpdate::rejected`] and not applied
//! - ticket references attach only to `paid` registrations that have none

use crate::admission::{AdmissionController, AdmissionRejection};
use crate::status::{IllegalTransition, RegistrationStatus};
use crate::store::{ParticipantStore, StoreError, StoredParticipant, Version};
use crate::types::{EventId, Money, OrderId, Participant, Registration};
use chrono::{DateTime, Utc};

/// Result of [`ParticipantTransaction::update_registration_status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Registrations moved out of `pending`
    pub applied: Vec<EventId>,
    /// Registrations already in the requested status
    pub unchanged: Vec<EventId>,
    /// Registrations in the opposite terminal status; left untouched
    pub rejected: Vec<(EventId, IllegalTransition)>,
    /// Registrations already in the requested status under another provider transaction
    pub mismatched: Vec<TxnMismatch>,
}

/// A resolved registration whose recorded provider transaction differs from the incoming one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnMismatch {
    /// Affected registration
    pub event_id: EventId,
    /// Transaction id kept on the registration
    pub recorded: String,
    /// Transaction id carried by the new event
    pub received: String,
}

impl StatusUpdate {
    /// Number of registrations that matched the selector.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.applied.len() + self.unchanged.len() + self.rejected.len() + self.mismatched.len()
    }
}

/// Participant snapshot with staged, uncommitted changes.
#[derive(Debug, Clone)]
pub struct ParticipantTransaction {
    participant: Participant,
    base: Option<Version>,
    changed: bool,
}

impl ParticipantTransaction {
    /// Open a transaction over an existing participant.
    #[must_use]
    pub fn begin(snapshot: StoredParticipant) -> Self {
        Self {
            participant: snapshot.participant,
            base: Some(snapshot.version),
            changed: false,
        }
    }

    /// Open a transaction that will insert a new participant.
    #[must_use]
    pub const fn create(participant: Participant) -> Self {
        Self {
            participant,
            base: None,
            changed: true,
        }
    }

    /// Open over `snapshot`, or over a new participant built by `new_participant`.
    #[must_use]
    pub fn begin_or_create(
        snapshot: Option<StoredParticipant>,
        new_participant: impl FnOnce() -> Participant,
    ) -> Self {
        snapshot.map_or_else(|| Self::create(new_participant()), Self::begin)
    }

    /// Current staged view.
    #[must_use]
    pub const fn participant(&self) -> &Participant {
        &self.participant
    }

    /// `true` when commit will insert rather than update.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.base.is_none()
    }

    /// Version the snapshot was read at.
    #[must_use]
    pub const fn base_version(&self) -> Option<Version> {
        self.base
    }

    /// `true` when commit would write.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.changed
    }

    /// Append a batch of `pending` registrations for one order.
    ///
    /// The batch is admitted against the snapshot, so a stale snapshot that
    /// passed here is still caught by the compare-and-write at commit.
    ///
    /// # Errors
    ///
    /// Returns the [`AdmissionRejection`] and stages nothing if the batch is refused.
    pub fn append_registrations(
        &mut self,
        admission: &AdmissionController,
        event_ids: &[EventId],
        order_id: &OrderId,
        amount: Money,
        registered_at: DateTime<Utc>,
    ) -> Result<(), AdmissionRejection> {
        admission
            .evaluate(&self.participant.registrations, event_ids)
            .into_result()?;

        self.participant
            .registrations
            .extend(event_ids.iter().map(|event_id| {
                Registration::pending(event_id.clone(), order_id.clone(), amount, registered_at)
            }));
        self.changed = true;
        Ok(())
    }

    /// Append `pending` registrations one event at a time, skipping refused ones.
    ///
    /// Used when a payment arrives for an order the participant record never
    /// saw. Returns the skipped events with their rejection.
    pub fn append_admissible(
        &mut self,
        admission: &AdmissionController,
        event_ids: &[EventId],
        order_id: &OrderId,
        amount: Money,
        registered_at: DateTime<Utc>,
    ) -> Vec<(EventId, AdmissionRejection)> {
        let mut skipped = Vec::new();
        for event_id in event_ids {
            let single = std::slice::from_ref(event_id);
            if let Err(reason) =
                self.append_registrations(admission, single, order_id, amount, registered_at)
            {
                skipped.push((event_id.clone(), reason));
            }
        }
        skipped
    }

    /// Move the registrations of `order_id` (optionally only `event_id`) to `new_status`.
    ///
    /// Only `pending` rows change. Rows already in `new_status` are reported
    /// as unchanged, or as mismatched when they record a different provider
    /// transaction id; rows in the other terminal status are reported as
    /// rejected. Resolved rows are never modified.
    pub fn update_registration_status(
        &mut self,
        order_id: &OrderId,
        event_id: Option<&EventId>,
        new_status: RegistrationStatus,
        provider_txn_id: Option<&str>,
    ) -> StatusUpdate {
        let mut update = StatusUpdate::default();

        let selected = self.participant.registrations.iter_mut().filter(|r| {
            &r.order_id == order_id && event_id.is_none_or(|id| &r.event_id == id)
        });

        for registration in selected {
            match registration.status.transition(new_status) {
                Ok(next) => {
                    registration.status = next;
                    if let Some(txn) = provider_txn_id {
                        registration.provider_txn_id = Some(txn.to_string());
                    }
                    update.applied.push(registration.event_id.clone());
                },
                Err(_) if registration.status == new_status => {
                    match (registration.provider_txn_id.as_deref(), provider_txn_id) {
                        (Some(recorded), Some(received)) if recorded != received => {
                            update.mismatched.push(TxnMismatch {
                                event_id: registration.event_id.clone(),
                                recorded: recorded.to_string(),
                                received: received.to_string(),
                            });
                        },
                        _ => update.unchanged.push(registration.event_id.clone()),
                    }
                },
                Err(illegal) => {
                    update.rejected.push((registration.event_id.clone(), illegal));
                },
            }
        }

        if !update.applied.is_empty() {
            self.changed = true;
        }
        update
    }

    /// Attach a ticket URL to every paid, ticketless registration of `order_id`.
    ///
    /// Returns how many registrations received the reference.
    pub fn attach_ticket(&mut self, order_id: &OrderId, ticket_url: &str) -> usize {
        let mut attached = 0;
        for registration in &mut self.participant.registrations {
            if &registration.order_id == order_id && registration.awaits_ticket() {
                registration.ticket_url = Some(ticket_url.to_string());
                attached += 1;
            }
        }
        if attached > 0 {
            self.changed = true;
        }
        attached
    }

    /// Discard staged changes.
    pub fn abort(self) {}

    /// Write staged changes with a compare-and-write.
    ///
    /// Returns the committed version, or the snapshot version when nothing changed.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`]; [`StoreError::Conflict`] means the snapshot
    /// went stale and the caller should re-read and retry.
    pub async fn commit(self, store: &dyn ParticipantStore) -> Result<Version, StoreError> {
        match (self.base, self.changed) {
            (Some(version), false) => Ok(version),
            (None, _) => store.create(self.participant).await,
            (Some(version), true) => store.save(self.participant, version).await,
        }
    }
}
