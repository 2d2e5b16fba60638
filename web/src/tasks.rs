//! Tracked background work spawned by handlers.
//!
//! Webhooks are acknowledged before they are applied. The apply step runs on
//! a [`WebhookTasks`] set so the server can wait for it during shutdown
//! instead of dropping it with the runtime.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinSet;

/// Set of in-flight webhook tasks.
#[derive(Debug, Default)]
pub struct WebhookTasks {
    set: Mutex<JoinSet<()>>,
}

impl WebhookTasks {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` onto the set. Finished tasks are reaped first.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(finished) = set.try_join_next() {
            log_join(finished);
        }
        set.spawn(task);
    }

    /// Tasks spawned and not yet reaped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every task spawned so far. Returns how many were awaited.
    ///
    /// Dropping the returned future aborts whatever is still running.
    pub async fn drain(&self) -> usize {
        let mut set = {
            let mut guard = self.set.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        let mut drained = 0;
        while let Some(finished) = set.join_next().await {
            log_join(finished);
            drained += 1;
        }
        drained
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "Webhook task did not complete");
    }
}
