//! Participant store trait and related types.
//!
//! A participant and its registrations are stored as one unit guarded by a
//! monotonically increasing [`Version`]. Writers read a snapshot, stage their
//! changes in a [`crate::transaction::ParticipantTransaction`] and commit
//! with a compare-and-write: if another writer committed in between, the
//! write fails with [`StoreError::Conflict`] and nothing is applied.
//!
//! This compare-and-write is the only mutual exclusion in the system. No
//! in-memory lock is held while gateway or issuer calls are in flight.
//!
//! # Implementations
//!
//! - `PostgresParticipantStore` (in `fest-postgres`): production
//! - `InMemoryParticipantStore` (in `fest-testing`): fast, deterministic tests
//!
//! # Example
//!
//! ```no_run
//! use fest_core::store::{ParticipantStore, StoreError};
//! use fest_core::types::Phone;
//!
//! async fn example<S: ParticipantStore>(store: &S) -> Result<(), StoreError> {
//!     if let Some(stored) = store.find_by_phone(&Phone::new("9876543210")).await? {
//!         let mut participant = stored.participant;
//!         participant.name = "Asha R".to_string();
//!         store.save(participant, stored.version).await?;
//!     }
//!     Ok(())
//! }
//! ```

use crate::types::{OrderId, Participant, Phone};
use crate::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Optimistic concurrency token for a participant record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version assigned by the first successful `create`.
    pub const INITIAL: Self = Self(1);

    /// Wrap a raw version.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The version a successful write produces.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Participant snapshot plus the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredParticipant {
    /// Snapshot
    pub participant: Participant,
    /// Version of the snapshot
    pub version: Version,
}

/// One (participant, order) pair that is paid but has no ticket yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingTicket {
    /// Participant phone
    pub phone: Phone,
    /// Order whose ticket is missing
    pub order_id: OrderId,
}

/// Errors that can occur during participant store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the record changed since it was read.
    #[error("Concurrency conflict for {phone}: expected {expected:?}, found {actual:?}")]
    Conflict {
        /// Participant whose record changed
        phone: Phone,
        /// Version the writer read (`None` when creating)
        expected: Option<Version>,
        /// Version currently stored (`None` when absent)
        actual: Option<Version>,
    },

    /// A write would break the cap or no-duplicate-event invariant.
    #[error("Invariant violation for {phone}: {detail}")]
    InvariantViolation {
        /// Participant concerned
        phone: Phone,
        /// What was violated
        detail: String,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored data could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// `true` for [`StoreError::Conflict`]; callers re-read and retry.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Durable, phone-keyed participant storage.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so services can hold an `Arc<dyn ParticipantStore>`.
pub trait ParticipantStore: Send + Sync {
    /// Read the current snapshot for `phone`.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    /// - `Serialization`: stored row could not be decoded
    fn find_by_phone(
        &self,
        phone: &Phone,
    ) -> BoxFuture<'_, Result<Option<StoredParticipant>, StoreError>>;

    /// Insert a participant that must not exist yet.
    ///
    /// Returns [`Version::INITIAL`].
    ///
    /// # Errors
    ///
    /// - `Conflict` with `expected: None` when the phone already exists
    /// - `InvariantViolation` when the registrations break an invariant
    /// - `Database`
    fn create(&self, participant: Participant) -> BoxFuture<'_, Result<Version, StoreError>>;

    /// Replace a participant if it is still at `expected`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// - `Conflict` when the stored version differs from `expected`
    /// - `InvariantViolation` when the registrations break an invariant
    /// - `Database`
    fn save(
        &self,
        participant: Participant,
        expected: Version,
    ) -> BoxFuture<'_, Result<Version, StoreError>>;

    /// Paid registrations that still lack a ticket, one entry per order.
    ///
    /// # Errors
    ///
    /// - `Database`
    fn list_ticket_pending(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<PendingTicket>, StoreError>>;
}
