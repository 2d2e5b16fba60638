//! # Fest Runtime
//!
//! Services that drive registration and payment reconciliation.
//!
//! This crate wires the pure logic in `fest-core` to its collaborators
//! (participant store, payment gateway, ticket issuer) and owns everything
//! that performs I/O:
//!
//! - **Registration**: admit a batch, create an order, persist `pending` rows
//! - **Reconciliation**: verify a payment webhook and apply its outcome
//! - **Tickets**: issue once per paid order and attach the reference
//! - **Backfill**: periodically retry paid orders that still lack a ticket
//! - **Lookup**: cached participant reads and entry verification
//! - **Retry / Metrics**: bounded backoff and Prometheus instrumentation
//!
//! ## Concurrency
//!
//! Every write is a compare-and-write on the participant's version. When a
//! write loses, the service re-reads the participant and repeats its
//! decision against the fresh snapshot. No lock is held across an `.await`.
//!
//! ## Example
//!
//! ```ignore
//! use fest_runtime::RegistrationService;
//!
//! let service = RegistrationService::new(store, gateway, clock, settings);
//! let confirmation = service.submit(input, event_ids, amount).await?;
//! println!("pay order {}", confirmation.order_id);
//! ```

/// Bounded retry with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub mod backfill;
pub mod cache;
pub mod lookup;
pub mod reconciliation;
pub mod registration;
pub mod tickets;

pub use backfill::{BackfillReport, TicketBackfill};
pub use cache::{Generation, ParticipantCache};
pub use lookup::ParticipantDirectory;
pub use reconciliation::{ReconcileOutcome, Reconciler, TicketOutcome};
pub use registration::{OrderConfirmation, RegistrationService};
pub use retry::RetryPolicy;
pub use tickets::{IssuedTicket, TicketService};
