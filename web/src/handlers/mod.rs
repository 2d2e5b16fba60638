//! HTTP request handlers.

pub mod health;
pub mod participants;
pub mod registration;
pub mod webhook;

pub use health::health_check;
pub use participants::{get_participant, verify_entry};
pub use registration::submit_registration;
pub use webhook::payment_webhook;
