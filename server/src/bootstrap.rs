//! Service wiring.
//!
//! Builds the runtime services from configuration and collaborator
//! handles. I/O setup (pool, listeners) stays in `main`.

use crate::config::Config;
use fest_core::environment::{Clock, SystemClock};
use fest_core::gateway::PaymentGateway;
use fest_core::store::ParticipantStore;
use fest_core::ticket::TicketIssuer;
use fest_runtime::{
    ParticipantCache, ParticipantDirectory, Reconciler, RegistrationService, TicketBackfill,
    TicketService,
};
use fest_web::AppState;
use std::sync::Arc;

/// Everything the HTTP surface and background tasks share.
pub struct Services {
    /// Handler state
    pub app_state: AppState,
    /// Ticket backfill sweep
    pub backfill: Arc<TicketBackfill>,
}

/// Wire the services around `store`, `gateway` and `issuer`.
#[must_use]
pub fn build_services(
    config: &Config,
    store: Arc<dyn ParticipantStore>,
    gateway: Arc<dyn PaymentGateway>,
    issuer: Arc<dyn TicketIssuer>,
) -> Services {
    build_services_with_clock(config, store, gateway, issuer, Arc::new(SystemClock))
}

/// As [`build_services`], with an explicit clock.
#[must_use]
pub fn build_services_with_clock(
    config: &Config,
    store: Arc<dyn ParticipantStore>,
    gateway: Arc<dyn PaymentGateway>,
    issuer: Arc<dyn TicketIssuer>,
    clock: Arc<dyn Clock>,
) -> Services {
    let settings = config.fest_settings();
    let retry = config.retry_policy();
    let cache = Arc::new(ParticipantCache::new(config.cache_ttl));

    let registration = RegistrationService::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        Arc::clone(&clock),
        settings.clone(),
    )
    .with_retry_policy(retry.clone())
    .with_cache(Arc::clone(&cache));

    let tickets = Arc::new(
        TicketService::new(Arc::clone(&store), issuer, retry, settings.max_conflict_retries)
            .with_cache(Arc::clone(&cache)),
    );

    let reconciler = Reconciler::new(
        Arc::clone(&store),
        gateway,
        Arc::clone(&tickets),
        clock,
        settings,
        config.razorpay.webhook_secret.as_bytes(),
    )
    .with_cache(Arc::clone(&cache));

    let backfill = Arc::new(TicketBackfill::new(
        Arc::clone(&store),
        tickets,
        config.backfill.batch_size,
    ));
    let directory = ParticipantDirectory::new(store, cache);

    Services {
        app_state: AppState::new(
            Arc::new(registration),
            Arc::new(reconciler),
            Arc::new(directory),
        ),
        backfill,
    }
}
