//! Shared wiring for the service integration tests.

#![allow(dead_code)]

use fest_core::settings::FestSettings;
use fest_runtime::{
    ParticipantCache, ParticipantDirectory, Reconciler, RegistrationService, RetryPolicy,
    TicketBackfill, TicketService,
};
use fest_testing::fixtures::TEST_WEBHOOK_SECRET;
use fest_testing::{InMemoryParticipantStore, MockPaymentGateway, MockTicketIssuer, test_clock};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_EVENTS: usize = 4;

pub struct Harness {
    pub store: InMemoryParticipantStore,
    pub gateway: MockPaymentGateway,
    pub issuer: MockTicketIssuer,
    pub cache: Arc<ParticipantCache>,
    pub registration: Arc<RegistrationService>,
    pub reconciler: Arc<Reconciler>,
    pub backfill: TicketBackfill,
    pub directory: ParticipantDirectory,
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(3)
        .base_delay(Duration::from_millis(1))
        .jitter(0.0)
        .build()
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(MockPaymentGateway::new())
    }

    pub fn with_gateway(gateway: MockPaymentGateway) -> Self {
        let store = InMemoryParticipantStore::new().with_max_active(MAX_EVENTS);
        let issuer = MockTicketIssuer::new();
        let cache = Arc::new(ParticipantCache::new(Duration::from_secs(30)));
        let settings = FestSettings {
            max_events: MAX_EVENTS,
            ..FestSettings::default()
        };
        let store_handle: Arc<dyn fest_core::ParticipantStore> = Arc::new(store.clone());
        let clock = Arc::new(test_clock());

        let registration = RegistrationService::new(
            Arc::clone(&store_handle),
            gateway.shared(),
            clock.clone(),
            settings.clone(),
        )
        .with_retry_policy(fast_retry())
        .with_cache(Arc::clone(&cache));

        let tickets = Arc::new(
            TicketService::new(
                Arc::clone(&store_handle),
                issuer.shared(),
                fast_retry(),
                settings.max_conflict_retries,
            )
            .with_cache(Arc::clone(&cache)),
        );

        let reconciler = Reconciler::new(
            Arc::clone(&store_handle),
            gateway.shared(),
            Arc::clone(&tickets),
            clock,
            settings,
            TEST_WEBHOOK_SECRET,
        )
        .with_cache(Arc::clone(&cache));

        let backfill = TicketBackfill::new(Arc::clone(&store_handle), tickets, 25);
        let directory = ParticipantDirectory::new(store_handle, Arc::clone(&cache));

        Self {
            store,
            gateway,
            issuer,
            cache,
            registration: Arc::new(registration),
            reconciler: Arc::new(reconciler),
            backfill,
            directory,
        }
    }
}
