//! Participant lookup and entry verification.
//!
//! Reads go through the [`ParticipantCache`]; the services invalidate it on
//! every committed change, so a cached entry is at most one TTL old only
//! when the change came from another process. A read that overlaps an
//! invalidation is served but not cached.

use crate::cache::ParticipantCache;
use fest_core::store::{ParticipantStore, StoreError};
use fest_core::types::{EventId, Participant, Phone, Registration};
use std::sync::Arc;

/// Read-side access to participants.
pub struct ParticipantDirectory {
    store: Arc<dyn ParticipantStore>,
    cache: Arc<ParticipantCache>,
}

impl ParticipantDirectory {
    /// Create a directory backed by `store` and `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn ParticipantStore>, cache: Arc<ParticipantCache>) -> Self {
        Self { store, cache }
    }

    /// Participant with all registrations, or `None` when unknown.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn get(&self, phone: &Phone) -> Result<Option<Participant>, StoreError> {
        if let Some(cached) = self.cache.get(phone) {
            tracing::trace!(%phone, "Participant cache hit");
            return Ok(Some(cached.participant));
        }

        let generation = self.cache.generation(phone);
        let stored = self.store.find_by_phone(phone).await?;
        Ok(stored.map(|stored| {
            let participant = stored.participant.clone();
            self.cache.insert(stored, generation);
            participant
        }))
    }

    /// The paid registration admitting `phone` to `event_id`, if any.
    ///
    /// Pending and failed registrations never admit.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn verify(&self, phone: &Phone, event_id: &EventId) -> Result<Option<Registration>, StoreError> {
        let participant = self.get(phone).await?;
        let admitted = participant.and_then(|p| p.paid_registration_for(event_id).cloned());
        tracing::debug!(%phone, %event_id, admitted = admitted.is_some(), "Entry verification");
        Ok(admitted)
    }
}
