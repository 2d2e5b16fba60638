//! Payment reconciliation.
//!
//! Applies an asynchronous payment outcome to the provisional registrations
//! of one order. Processing is split in two:
//!
//! 1. [`Reconciler::verify`] authenticates the raw body and parses it. This
//!    is cheap and runs before the caller acknowledges the webhook.
//! 2. [`Reconciler::apply`] resolves the participant, moves the order's
//!    `pending` registrations to `paid` or `failed` with a compare-and-write
//!    and, on the paid path, issues the ticket.
//!
//! `apply` is idempotent. A redelivered event finds every registration of
//! the order already in the requested terminal status and returns
//! [`ReconcileOutcome::Duplicate`] without writing or issuing anything. An
//! event that contradicts an earlier terminal outcome, or a capture carrying
//! a different provider transaction for an order that is already paid, is
//! logged as an anomaly and not applied.
//!
//! Only the delivery whose status write commits goes on to issue the
//! ticket, so concurrent deliveries of the same event produce one ticket.

use crate::cache::ParticipantCache;
use crate::metrics::{ReconciliationMetrics, StoreMetrics};
use crate::tickets::TicketService;
use fest_core::admission::AdmissionController;
use fest_core::environment::Clock;
use fest_core::error::ServiceError;
use fest_core::gateway::PaymentGateway;
use fest_core::settings::FestSettings;
use fest_core::status::RegistrationStatus;
use fest_core::store::{ParticipantStore, StoreError, StoredParticipant, Version};
use fest_core::transaction::ParticipantTransaction;
use fest_core::types::Participant;
use fest_core::webhook::{PaymentEvent, ProviderStatus, parse_payment_event};
use std::sync::Arc;

/// What happened to the ticket of a paid order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketOutcome {
    /// Failed payments get no ticket
    NotRequired,
    /// Issued and attached
    Issued {
        /// Artifact URL
        url: String,
    },
    /// Issuance failed; the order waits for the backfill sweep
    Pending {
        /// Last error
        error: String,
    },
}

/// Result of applying one payment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Registrations moved to a terminal status.
    Applied {
        /// New status
        status: RegistrationStatus,
        /// Registrations that changed
        registrations: usize,
        /// Ticket result on the paid path
        ticket: TicketOutcome,
    },
    /// Every registration of the order already had this outcome.
    Duplicate {
        /// Status found
        status: RegistrationStatus,
    },
    /// The order already resolved to the opposite outcome; nothing applied.
    Conflicting {
        /// Status that was kept
        kept: RegistrationStatus,
    },
    /// The order is already paid under another provider transaction; nothing applied.
    SecondPayment {
        /// Transaction id kept on the registrations
        recorded: String,
        /// Transaction id of this event
        received: String,
    },
    /// Provider status is not an outcome (`authorized`, `created`, ...).
    Ignored {
        /// Status as reported by the provider
        provider_status: String,
    },
}

/// Applies payment webhooks to participant registrations.
pub struct Reconciler {
    store: Arc<dyn ParticipantStore>,
    gateway: Arc<dyn PaymentGateway>,
    tickets: Arc<TicketService>,
    clock: Arc<dyn Clock>,
    settings: FestSettings,
    admission: AdmissionController,
    webhook_secret: Vec<u8>,
    cache: Option<Arc<ParticipantCache>>,
}

impl Reconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        store: Arc<dyn ParticipantStore>,
        gateway: Arc<dyn PaymentGateway>,
        tickets: Arc<TicketService>,
        clock: Arc<dyn Clock>,
        settings: FestSettings,
        webhook_secret: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            store,
            gateway,
            tickets,
            clock,
            admission: AdmissionController::new(settings.max_events),
            settings,
            webhook_secret: webhook_secret.into(),
            cache: None,
        }
    }

    /// Invalidate `cache` after every committed status change.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ParticipantCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Authenticate and parse a raw webhook body.
    ///
    /// The signature is checked over the verbatim bytes before anything is
    /// parsed and before any store access.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidSignature`]: signature missing or wrong
    /// - [`ServiceError::MalformedPayload`]: body is not a usable payment event
    pub fn verify(&self, raw_body: &[u8], signature: &str) -> Result<PaymentEvent, ServiceError> {
        if !self
            .gateway
            .verify_signature(raw_body, signature, &self.webhook_secret)
        {
            tracing::warn!(body_len = raw_body.len(), "Webhook signature rejected");
            return Err(ServiceError::InvalidSignature);
        }

        parse_payment_event(raw_body).map_err(|err| {
            tracing::warn!(error = %err, "Webhook payload rejected");
            ServiceError::MalformedPayload(err.to_string())
        })
    }

    /// Verify and apply in one call.
    ///
    /// # Errors
    ///
    /// Errors from [`Reconciler::verify`] and [`Reconciler::apply`].
    pub async fn reconcile(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let event = self.verify(raw_body, signature)?;
        self.apply(event).await
    }

    /// Apply a verified payment event.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::OrphanedPayment`]: the order cannot be tied to any registration
    /// - [`ServiceError::Persistence`]: store failure or conflicts beyond the retry budget
    ///
    /// Ticket failures do not fail reconciliation; they are reported in
    /// [`TicketOutcome::Pending`].
    #[tracing::instrument(
        skip(self, event),
        fields(phone = %event.metadata.phone, order_id = %event.order_id, txn = %event.provider_txn_id),
        name = "reconcile_payment"
    )]
    pub async fn apply(&self, event: PaymentEvent) -> Result<ReconcileOutcome, ServiceError> {
        let Some(target) = event.status.outcome() else {
            let provider_status = match &event.status {
                ProviderStatus::Other(status) => status.clone(),
                other => format!("{other:?}"),
            };
            tracing::info!(status = %provider_status, "Non-final payment status acknowledged without changes");
            return Ok(ReconcileOutcome::Ignored { provider_status });
        };

        let (participant, applied) = match self.transition(&event, target).await? {
            Transition::Committed {
                participant,
                applied,
                version,
            } => {
                tracing::info!(status = %target, applied, %version, "Payment outcome applied");
                ReconciliationMetrics::record_applied(target.as_str());
                (participant, applied)
            },
            Transition::Unchanged(outcome) => return Ok(outcome),
        };

        let ticket = if target == RegistrationStatus::Paid {
            match self
                .tickets
                .issue_for_order(&participant, &event.order_id)
                .await
            {
                Ok(Some(issued)) => TicketOutcome::Issued { url: issued.url },
                Ok(None) => TicketOutcome::NotRequired,
                Err(err) => TicketOutcome::Pending {
                    error: err.to_string(),
                },
            }
        } else {
            TicketOutcome::NotRequired
        };

        Ok(ReconcileOutcome::Applied {
            status: target,
            registrations: applied,
            ticket,
        })
    }

    async fn transition(
        &self,
        event: &PaymentEvent,
        target: RegistrationStatus,
    ) -> Result<Transition, ServiceError> {
        let phone = &event.metadata.phone;
        let mut last_conflict = None;

        for attempt in 0..=self.settings.max_conflict_retries {
            let snapshot = self.store.find_by_phone(phone).await?;
            let mut tx = self.open(snapshot, event)?;

            let update = tx.update_registration_status(
                &event.order_id,
                None,
                target,
                Some(&event.provider_txn_id),
            );

            for (event_id, illegal) in &update.rejected {
                tracing::warn!(
                    %event_id,
                    error = %illegal,
                    "Conflicting payment outcome for a resolved registration ignored"
                );
                ReconciliationMetrics::record_anomaly();
            }

            let second_payment = if target == RegistrationStatus::Paid {
                for mismatch in &update.mismatched {
                    tracing::error!(
                        event_id = %mismatch.event_id,
                        recorded = %mismatch.recorded,
                        received = %mismatch.received,
                        "Second captured payment for a paid order requires manual reconciliation"
                    );
                    ReconciliationMetrics::record_anomaly();
                }
                update.mismatched.first()
            } else {
                for mismatch in &update.mismatched {
                    tracing::info!(
                        event_id = %mismatch.event_id,
                        recorded = %mismatch.recorded,
                        received = %mismatch.received,
                        "Further failed payment attempt for a failed order"
                    );
                }
                None
            };

            if update.applied.is_empty() {
                tx.abort();
                let outcome = if let Some((_, illegal)) = update.rejected.first() {
                    ReconcileOutcome::Conflicting { kept: illegal.from }
                } else if let Some(mismatch) = second_payment {
                    ReconcileOutcome::SecondPayment {
                        recorded: mismatch.recorded.clone(),
                        received: mismatch.received.clone(),
                    }
                } else {
                    tracing::info!(status = %target, "Duplicate payment delivery, no changes");
                    ReconciliationMetrics::record_duplicate();
                    ReconcileOutcome::Duplicate { status: target }
                };
                return Ok(Transition::Unchanged(outcome));
            }

            for registration in tx.participant().registrations_for_order(&event.order_id) {
                if registration.amount != event.amount {
                    tracing::warn!(
                        event_id = %registration.event_id,
                        expected = %registration.amount,
                        received = %event.amount,
                        "Payment amount differs from registered amount"
                    );
                }
            }

            let participant = tx.participant().clone();
            match tx.commit(self.store.as_ref()).await {
                Ok(version) => {
                    if let Some(cache) = &self.cache {
                        cache.invalidate(phone);
                    }
                    return Ok(Transition::Committed {
                        participant,
                        applied: update.applied.len(),
                        version,
                    });
                },
                Err(err) if err.is_conflict() => {
                    tracing::debug!(attempt, error = %err, "Participant changed concurrently, re-reading");
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

    /// Open a transaction holding registrations for the event's order.
    ///
    /// Missing participants are created from the metadata. A participant
    /// without registrations for the order gets them from the metadata event
    /// ids, subject to admission; otherwise the payment is orphaned.
    fn open(
        &self,
        snapshot: Option<StoredParticipant>,
        event: &PaymentEvent,
    ) -> Result<ParticipantTransaction, ServiceError> {
        let now = self.clock.now();
        let mut tx = match snapshot {
            Some(stored) => ParticipantTransaction::begin(stored),
            None => {
                let participant = event
                    .metadata
                    .new_participant(now)
                    .map_err(|err| orphaned(event, format!("unknown participant and {err}")))?;
                tracing::info!("Participant created from payment metadata");
                ParticipantTransaction::create(participant)
            },
        };

        if has_order(tx.participant(), event) {
            return Ok(tx);
        }

        if event.metadata.event_ids.is_empty() {
            return Err(orphaned(event, "no registrations reference this order".to_string()));
        }

        let skipped = tx.append_admissible(
            &self.admission,
            &event.metadata.event_ids,
            &event.order_id,
            event.amount,
            now,
        );
        for (event_id, reason) in &skipped {
            tracing::warn!(%event_id, reason = reason.code(), "Paid event could not be registered");
            ReconciliationMetrics::record_anomaly();
        }

        if has_order(tx.participant(), event) {
            tracing::info!(
                restored = event.metadata.event_ids.len() - skipped.len(),
                "Registrations restored from payment metadata"
            );
            Ok(tx)
        } else {
            Err(orphaned(event, "no metadata event could be registered".to_string()))
        }
    }

}

enum Transition {
    Committed {
        participant: Participant,
        applied: usize,
        version: Version,
    },
    Unchanged(ReconcileOutcome),
}

fn orphaned(event: &PaymentEvent, detail: String) -> ServiceError {
    tracing::error!(detail = %detail, "Orphaned payment requires manual reconciliation");
    ReconciliationMetrics::record_orphaned();
    ServiceError::OrphanedPayment {
        phone: event.metadata.phone.clone(),
        order_id: event.order_id.clone(),
        detail,
    }
}

fn has_order(participant: &Participant, event: &PaymentEvent) -> bool {
    participant
        .registrations_for_order(&event.order_id)
        .next()
        .is_some()
}
