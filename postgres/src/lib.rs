//! `PostgreSQL` participant store for fest registration.
//!
//! Implements the `ParticipantStore` trait from `fest-core` on top of sqlx:
//!
//! - Version-column compare-and-write for every participant update
//! - Partial unique index for "one active registration per event"
//! - Bundled migrations (`migrations/`)
//!
//! # Example
//!
//! ```ignore
//! use fest_postgres::PostgresParticipantStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresParticipantStore::new("postgres://localhost/fest").await?;
//!     store.run_migrations().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod participant_store;

pub use participant_store::PostgresParticipantStore;
