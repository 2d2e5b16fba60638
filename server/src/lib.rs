//! Fest registration server.
//!
//! Environment configuration, the HTTP clients for the payment provider and
//! the ticket service, and the wiring that turns them into the runtime
//! services served by `fest-web`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod razorpay;
pub mod ticket_client;

pub use bootstrap::{Services, build_services};
pub use config::Config;
pub use razorpay::RazorpayGateway;
pub use ticket_client::HttpTicketIssuer;
