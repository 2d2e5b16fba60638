//! In-memory participant store for fast, deterministic tests.
//!
//! Implements the same compare-and-write contract as the Postgres store:
//! `save` only succeeds when the stored version still equals the expected
//! one. The map lock is released before every `.await`.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use fest_core::BoxFuture;
use fest_core::store::{ParticipantStore, PendingTicket, StoreError, StoredParticipant, Version};
use fest_core::types::{Participant, Phone};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Map-backed participant storage with version checks.
///
/// # Example
///
/// ```
/// use fest_testing::InMemoryParticipantStore;
/// use fest_testing::fixtures::participant;
/// use fest_core::store::ParticipantStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryParticipantStore::new();
/// let version = store.create(participant("9876543210")).await?;
///
/// let stored = store.find_by_phone(&"9876543210".into()).await?;
/// assert_eq!(stored.map(|s| s.version), Some(version));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryParticipantStore {
    data: Arc<Mutex<BTreeMap<Phone, StoredParticipant>>>,
    max_active: Option<usize>,
    find_calls: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    forced_conflicts: Arc<AtomicUsize>,
}

impl InMemoryParticipantStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reject writes that leave more than `max_active` active registrations.
    #[must_use]
    pub const fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = Some(max_active);
        self
    }

    /// Insert a participant directly at [`Version::INITIAL`], bypassing checks.
    pub fn seed(&self, participant: Participant) {
        self.data.lock().unwrap().insert(
            participant.phone.clone(),
            StoredParticipant {
                participant,
                version: Version::INITIAL,
            },
        );
    }

    /// Current participant for `phone`, without counting as a lookup.
    #[must_use]
    pub fn get(&self, phone: &str) -> Option<Participant> {
        self.data
            .lock()
            .unwrap()
            .get(&Phone::new(phone))
            .map(|s| s.participant.clone())
    }

    /// Current version for `phone`.
    #[must_use]
    pub fn version(&self, phone: &str) -> Option<Version> {
        self.data.lock().unwrap().get(&Phone::new(phone)).map(|s| s.version)
    }

    /// Number of `find_by_phone` calls so far.
    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Number of successful `create`/`save` calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next `count` saves fail with a conflict without writing.
    pub fn force_conflicts(&self, count: usize) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of stored participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// `true` when no participant is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_invariants(&self, participant: &Participant) -> Result<(), StoreError> {
        let duplicates = participant.duplicate_active_events();
        if !duplicates.is_empty() {
            return Err(StoreError::InvariantViolation {
                phone: participant.phone.clone(),
                detail: format!("duplicate active events: {duplicates:?}"),
            });
        }
        if let Some(max) = self.max_active {
            let active = participant.active_registrations().count();
            if active > max {
                return Err(StoreError::InvariantViolation {
                    phone: participant.phone.clone(),
                    detail: format!("{active} active registrations exceed cap {max}"),
                });
            }
        }
        Ok(())
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ParticipantStore for InMemoryParticipantStore {
    fn find_by_phone(
        &self,
        phone: &Phone,
    ) -> BoxFuture<'_, Result<Option<StoredParticipant>, StoreError>> {
        let phone = phone.clone();
        Box::pin(async move {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.data.lock().unwrap().get(&phone).cloned())
        })
    }

    fn create(&self, participant: Participant) -> BoxFuture<'_, Result<Version, StoreError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.check_invariants(&participant)?;

            let mut data = self.data.lock().unwrap();
            if let Some(existing) = data.get(&participant.phone) {
                return Err(StoreError::Conflict {
                    phone: participant.phone.clone(),
                    expected: None,
                    actual: Some(existing.version),
                });
            }
            data.insert(
                participant.phone.clone(),
                StoredParticipant {
                    participant,
                    version: Version::INITIAL,
                },
            );
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(Version::INITIAL)
        })
    }

    fn save(
        &self,
        participant: Participant,
        expected: Version,
    ) -> BoxFuture<'_, Result<Version, StoreError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;

            let mut data = self.data.lock().unwrap();
            let actual = data.get(&participant.phone).map(|s| s.version);
            if actual != Some(expected) || self.take_forced_conflict() {
                return Err(StoreError::Conflict {
                    phone: participant.phone.clone(),
                    expected: Some(expected),
                    actual,
                });
            }
            self.check_invariants(&participant)?;

            let next = expected.next();
            data.insert(
                participant.phone.clone(),
                StoredParticipant {
                    participant,
                    version: next,
                },
            );
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(next)
        })
    }

    fn list_ticket_pending(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<PendingTicket>, StoreError>> {
        Box::pin(async move {
            let data = self.data.lock().unwrap();
            let mut pending = BTreeSet::new();
            for stored in data.values() {
                for registration in stored.participant.registrations.iter().filter(|r| r.awaits_ticket()) {
                    pending.insert((stored.participant.phone.clone(), registration.order_id.clone()));
                }
            }
            Ok(pending
                .into_iter()
                .take(limit)
                .map(|(phone, order_id)| PendingTicket { phone, order_id })
                .collect())
        })
    }
}
