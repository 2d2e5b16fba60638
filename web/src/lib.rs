//! Axum HTTP surface for fest registration.
//!
//! Handlers translate HTTP into calls on the `fest-runtime` services and map
//! [`fest_core::error::ServiceError`] into [`AppError`] responses.
//!
//! # Routes
//!
//! | Method | Path                       | Handler                                 |
//! |--------|----------------------------|-----------------------------------------|
//! | POST   | `/registration`            | [`handlers::submit_registration`]       |
//! | POST   | `/payment-webhook`         | [`handlers::payment_webhook`]           |
//! | GET    | `/participants/:phone`     | [`handlers::get_participant`]           |
//! | GET    | `/verify/:phone/:event_id` | [`handlers::verify_entry`]              |
//! | GET    | `/health`                  | [`handlers::health_check`]              |
//!
//! # Example
//!
//! ```ignore
//! let app = fest_web::router(AppState::new(registration, reconciler, directory));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8081").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod tasks;

pub use error::AppError;
pub use extractors::CorrelationId;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::router;
pub use state::AppState;
pub use tasks::WebhookTasks;
