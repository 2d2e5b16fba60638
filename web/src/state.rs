//! Application state for Axum handlers.

use crate::tasks::WebhookTasks;
use fest_runtime::{ParticipantDirectory, Reconciler, RegistrationService};
use std::sync::Arc;

/// Services shared by all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Admits and persists registration batches
    pub registration: Arc<RegistrationService>,
    /// Applies signed payment webhooks
    pub reconciler: Arc<Reconciler>,
    /// Cached participant reads
    pub directory: Arc<ParticipantDirectory>,
    /// Accepted webhooks still being applied
    pub tasks: Arc<WebhookTasks>,
}

impl AppState {
    /// Bundle the services with an empty task set.
    #[must_use]
    pub fn new(
        registration: Arc<RegistrationService>,
        reconciler: Arc<Reconciler>,
        directory: Arc<ParticipantDirectory>,
    ) -> Self {
        Self {
            registration,
            reconciler,
            directory,
            tasks: Arc::new(WebhookTasks::new()),
        }
    }
}
