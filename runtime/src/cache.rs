//! Read-through cache for participant lookups.
//!
//! Entries expire after a fixed TTL and are dropped eagerly by the services
//! whenever they commit a change for the same phone. The lock is a plain
//! `std::sync::Mutex` and is never held across an `.await`.
//!
//! Every invalidation bumps a per-phone [`Generation`]. Readers take the
//! generation before going to the store and hand it back to
//! [`ParticipantCache::insert`]; a snapshot read across an invalidation is
//! discarded instead of re-cached.

use fest_core::store::StoredParticipant;
use fest_core::types::Phone;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Invalidation counter observed before a store read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Debug)]
struct Entry {
    stored: StoredParticipant,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<Phone, Entry>,
    generations: HashMap<Phone, u64>,
}

impl State {
    fn generation(&self, phone: &Phone) -> Generation {
        Generation(self.generations.get(phone).copied().unwrap_or(0))
    }
}

/// TTL cache of participant snapshots keyed by phone.
#[derive(Debug)]
pub struct ParticipantCache {
    ttl: Duration,
    state: Mutex<State>,
}

impl ParticipantCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(State::default()),
        }
    }

    /// Configured time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `phone`, if any. Expired entries are evicted.
    ///
    /// A poisoned lock behaves like an empty cache.
    #[must_use]
    pub fn get(&self, phone: &Phone) -> Option<StoredParticipant> {
        let Ok(mut state) = self.state.lock() else {
            return None;
        };
        match state.entries.get(phone) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.stored.clone()),
            Some(_) => {
                state.entries.remove(phone);
                None
            },
            None => None,
        }
    }

    /// Current invalidation generation for `phone`. Take it before reading the store.
    #[must_use]
    pub fn generation(&self, phone: &Phone) -> Generation {
        self.state
            .lock()
            .map_or(Generation(u64::MAX), |state| state.generation(phone))
    }

    /// Store a snapshot read at `observed`.
    ///
    /// The snapshot is dropped if `phone` was invalidated since `observed`
    /// was taken, or if a newer version is already cached.
    pub fn insert(&self, stored: StoredParticipant, observed: Generation) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let phone = stored.participant.phone.clone();
        if state.generation(&phone) != observed {
            tracing::trace!(%phone, "Snapshot read across an invalidation not cached");
            return;
        }
        let newer_cached = state
            .entries
            .get(&phone)
            .is_some_and(|entry| entry.stored.version > stored.version);
        if !newer_cached {
            state.entries.insert(
                phone,
                Entry {
                    stored,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Drop the entry for `phone` and fence out snapshots read before now.
    pub fn invalidate(&self, phone: &Phone) {
        if let Ok(mut state) = self.state.lock() {
            let generation = state.generations.entry(phone.clone()).or_insert(0);
            *generation = generation.wrapping_add(1);
            if state.entries.remove(phone).is_some() {
                tracing::trace!(%phone, "Participant cache entry invalidated");
            }
        }
    }

    /// Number of entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map_or(0, |state| state.entries.len())
    }

    /// `true` when no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
