//! # Fest Core
//!
//! Domain types and pure decision logic for fest registration.
//!
//! This crate contains everything that does not perform I/O:
//!
//! - **Types**: participants, registrations, orders and money
//! - **Status**: the registration state machine (`pending → paid | failed`)
//! - **Admission**: the per-participant event cap and duplicate-event rules
//! - **Transaction**: staged mutations against a participant snapshot,
//!   committed through a compare-and-write on the store
//! - **Collaborators**: traits for the payment gateway, ticket issuer and
//!   participant store, injected into the services in `fest-runtime`
//! - **Webhook**: signature verification and payment event parsing
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Dependency Injection via traits (`Arc<dyn PaymentGateway>`, ...)
//! - The store's compare-and-write is the only mutual exclusion
//!
//! ## Example
//!
//! ```
//! use fest_core::admission::{AdmissionController, Decision};
//! use fest_core::types::EventId;
//!
//! let controller = AdmissionController::new(4);
//! let decision = controller.evaluate(&[], &[EventId::new("hackathon")]);
//! assert_eq!(decision, Decision::Accept);
//! ```

use std::future::Future;
use std::pin::Pin;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod admission;
pub mod error;
pub mod gateway;
pub mod settings;
pub mod status;
pub mod store;
pub mod ticket;
pub mod transaction;
pub mod types;
pub mod webhook;

pub use admission::{AdmissionController, AdmissionRejection, Decision};
pub use error::{ServiceError, ValidationError};
pub use gateway::{GatewayError, Order, OrderNotes, OrderRequest, PaymentGateway};
pub use settings::FestSettings;
pub use status::{IllegalTransition, RegistrationStatus};
pub use store::{ParticipantStore, PendingTicket, StoreError, StoredParticipant, Version};
pub use ticket::{TicketError, TicketIssuer, TicketRequest};
pub use transaction::{ParticipantTransaction, StatusUpdate, TxnMismatch};
pub use types::{EventId, Money, OrderId, Participant, ParticipantInput, Phone, Registration};

/// Boxed, sendable future returned by the collaborator traits.
///
/// The traits use explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so they stay dyn compatible (`Arc<dyn ParticipantStore>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// into the services.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use fest_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
