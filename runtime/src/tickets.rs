//! Ticket issuance for paid orders.
//!
//! Issuance runs after the paid transition has been committed. The issuer is
//! called once per (participant, order), then the returned URL is attached
//! to every paid, ticketless registration of that order in a separate
//! compare-and-write. A conflict on that write re-reads and re-attaches the
//! same URL; the issuer is not called again.

use crate::cache::ParticipantCache;
use crate::metrics::{StoreMetrics, TicketMetrics};
use crate::retry::{RetryPolicy, retry_with_predicate};
use fest_core::error::ServiceError;
use fest_core::store::{ParticipantStore, StoreError};
use fest_core::ticket::{TicketError, TicketIssuer, TicketRequest};
use fest_core::transaction::ParticipantTransaction;
use fest_core::types::{OrderId, Participant, Phone};
use std::sync::Arc;

/// Result of a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTicket {
    /// Ticket artifact URL
    pub url: String,
    /// Registrations that now reference it
    pub attached: usize,
}

/// Issues tickets and attaches them to registrations.
pub struct TicketService {
    store: Arc<dyn ParticipantStore>,
    issuer: Arc<dyn TicketIssuer>,
    retry: RetryPolicy,
    max_conflict_retries: usize,
    cache: Option<Arc<ParticipantCache>>,
}

impl TicketService {
    /// Create a ticket service.
    #[must_use]
    pub fn new(
        store: Arc<dyn ParticipantStore>,
        issuer: Arc<dyn TicketIssuer>,
        retry: RetryPolicy,
        max_conflict_retries: usize,
    ) -> Self {
        Self {
            store,
            issuer,
            retry,
            max_conflict_retries,
            cache: None,
        }
    }

    /// Invalidate `cache` after every attach.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ParticipantCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the issuer request for `order_id`, or `None` if nothing awaits a ticket.
    #[must_use]
    pub fn request_for(participant: &Participant, order_id: &OrderId) -> Option<TicketRequest> {
        let awaiting: Vec<_> = participant
            .registrations_for_order(order_id)
            .filter(|r| r.awaits_ticket())
            .collect();
        let first = awaiting.first()?;

        Some(TicketRequest {
            participant_id: participant.phone.clone(),
            name: participant.name.clone(),
            phone: participant.phone.clone(),
            price: first.amount,
            event_count: awaiting.len(),
            order_id: order_id.clone(),
        })
    }

    /// Issue one ticket for `order_id` from `participant` and attach it.
    ///
    /// Returns `Ok(None)` when no registration of the order awaits a ticket.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::TicketIssuance`]: issuer failed after retries; the
    ///   registrations stay paid and ticketless
    /// - [`ServiceError::Persistence`]: the attach could not be committed
    pub async fn issue_for_order(
        &self,
        participant: &Participant,
        order_id: &OrderId,
    ) -> Result<Option<IssuedTicket>, ServiceError> {
        let Some(request) = Self::request_for(participant, order_id) else {
            return Ok(None);
        };
        let phone = participant.phone.clone();

        let url = match retry_with_predicate(
            &self.retry,
            "issue_ticket",
            || self.issuer.issue(request.clone()),
            TicketError::is_retryable,
        )
        .await
        {
            Ok(url) => url,
            Err(err) => {
                tracing::error!(%phone, %order_id, error = %err, "Ticket issuance failed, left for backfill");
                TicketMetrics::record_failed();
                return Err(err.into());
            },
        };

        let attached = self.attach(&phone, order_id, &url).await?;
        if attached == 0 {
            tracing::warn!(%phone, %order_id, url = %url, "Order already had a ticket; issued artifact discarded");
        } else {
            tracing::info!(%phone, %order_id, attached, "Ticket issued");
            TicketMetrics::record_issued();
        }

        Ok(Some(IssuedTicket { url, attached }))
    }

    async fn attach(&self, phone: &Phone, order_id: &OrderId, url: &str) -> Result<usize, ServiceError> {
        let mut last_conflict = None;

        for attempt in 0..=self.max_conflict_retries {
            let Some(snapshot) = self.store.find_by_phone(phone).await? else {
                return Err(StoreError::InvariantViolation {
                    phone: phone.clone(),
                    detail: format!("participant missing while attaching ticket for order {order_id}"),
                }
                .into());
            };

            let mut tx = ParticipantTransaction::begin(snapshot);
            let attached = tx.attach_ticket(order_id, url);
            if attached == 0 {
                tx.abort();
                return Ok(0);
            }

            match tx.commit(self.store.as_ref()).await {
                Ok(_) => {
                    if let Some(cache) = &self.cache {
                        cache.invalidate(phone);
                    }
                    return Ok(attached);
                },
                Err(err) if err.is_conflict() => {
                    tracing::debug!(%phone, %order_id, attempt, "Conflict while attaching ticket, re-reading");
                    StoreMetrics::record_conflict();
                    last_conflict = Some(err);
                },
                Err(err) => return Err(err.into()),
            }
        }

        Err(ServiceError::Persistence(last_conflict.unwrap_or_else(|| StoreError::Conflict {
            phone: phone.clone(),
            expected: None,
            actual: None,
        })))
    }
}
