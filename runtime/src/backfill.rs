//! Ticket backfill sweep.
//!
//! Paid registrations without a ticket are the work queue: whenever
//! issuance fails during reconciliation the order simply stays in
//! `list_ticket_pending` until a sweep issues it.

use crate::tickets::TicketService;
use fest_core::error::ServiceError;
use fest_core::store::{ParticipantStore, PendingTicket};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Orders read from the queue
    pub scanned: usize,
    /// Orders that received a ticket
    pub issued: usize,
    /// Orders whose issuance failed again
    pub failed: usize,
}

/// Re-issues tickets for paid, ticketless orders.
pub struct TicketBackfill {
    store: Arc<dyn ParticipantStore>,
    tickets: Arc<TicketService>,
    batch_size: usize,
}

impl TicketBackfill {
    /// Create a sweep that handles at most `batch_size` orders per run.
    #[must_use]
    pub fn new(store: Arc<dyn ParticipantStore>, tickets: Arc<TicketService>, batch_size: usize) -> Self {
        Self {
            store,
            tickets,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one sweep.
    ///
    /// Failures for individual orders are counted, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Persistence`] if the queue itself cannot be read.
    pub async fn run_once(&self) -> Result<BackfillReport, ServiceError> {
        let queue = self.store.list_ticket_pending(self.batch_size).await?;
        let mut report = BackfillReport {
            scanned: queue.len(),
            ..BackfillReport::default()
        };

        for item in queue {
            match self.backfill(&item).await {
                Ok(true) => report.issued += 1,
                Ok(false) => {},
                Err(e) => {
                    warn!(phone = %item.phone, order_id = %item.order_id, error = %e, "Ticket backfill failed");
                    report.failed += 1;
                },
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                issued = report.issued,
                failed = report.failed,
                "Ticket backfill sweep finished"
            );
        }
        Ok(report)
    }

    async fn backfill(&self, item: &PendingTicket) -> Result<bool, ServiceError> {
        let Some(snapshot) = self.store.find_by_phone(&item.phone).await? else {
            return Ok(false);
        };
        let issued = self
            .tickets
            .issue_for_order(&snapshot.participant, &item.order_id)
            .await?;
        Ok(issued.is_some_and(|ticket| ticket.attached > 0))
    }

    /// Sweep every `period` until `shutdown` fires.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), batch = self.batch_size, "Ticket backfill started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Ticket backfill received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) => debug!(?report, "Ticket backfill tick"),
                        Err(e) => error!(error = %e, "Ticket backfill could not read its queue"),
                    }
                }
            }
        }
    }
}
