//! Registration intent service.
//!
//! `submit` admits a batch of events for one participant, creates a payment
//! order and persists the batch as `pending` registrations referencing that
//! order. The write is a compare-and-write against the snapshot admission
//! ran on; when another writer for the same phone commits first, the
//! snapshot is re-read and admission runs again, so two concurrent submits
//! can never jointly exceed the cap.
//!
//! The order is created at most once per `submit`. A retry after a conflict
//! reuses it; if the retry is then refused, the order is left unpaid at the
//! gateway and no registration references it.

use crate::cache::ParticipantCache;
use crate::metrics::{RegistrationMetrics, StoreMetrics};
use crate::retry::{RetryPolicy, retry_with_predicate};
use fest_core::admission::{AdmissionController, Decision};
use fest_core::environment::Clock;
use fest_core::error::{ServiceError, ValidationError};
use fest_core::gateway::{GatewayError, NoteRegistration, Order, OrderNotes, OrderRequest, PaymentGateway};
use fest_core::settings::FestSettings;
use fest_core::store::{ParticipantStore, StoreError};
use fest_core::transaction::ParticipantTransaction;
use fest_core::types::{EventId, Money, OrderId, ParticipantInput, Phone};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// What the caller needs to complete payment out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderConfirmation {
    /// Gateway order id
    pub order_id: OrderId,
    /// Amount in minor units
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
}

/// Admits and persists registration batches.
pub struct RegistrationService {
    store: Arc<dyn ParticipantStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    settings: FestSettings,
    admission: AdmissionController,
    retry: RetryPolicy,
    cache: Option<Arc<ParticipantCache>>,
}

impl RegistrationService {
    /// Create a service with the default retry policy and no cache.
    #[must_use]
    pub fn new(
        store: Arc<dyn ParticipantStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        settings: FestSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            admission: AdmissionController::new(settings.max_events),
            settings,
            retry: RetryPolicy::default(),
            cache: None,
        }
    }

    /// Use `retry` for order creation.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Invalidate `cache` after every committed batch.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ParticipantCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Admit `event_ids` for the participant described by `input` and open an order.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`]: missing participant field or non-positive amount
    /// - [`ServiceError::AdmissionRejected`]: cap reached, duplicate event or bad selection
    /// - [`ServiceError::Gateway`]: order creation failed after retries
    /// - [`ServiceError::Persistence`]: store failure or conflicts beyond the retry budget
    #[tracing::instrument(skip(self, input, event_ids), fields(phone = %input.phone.trim(), events = event_ids.len()), name = "registration_submit")]
    pub async fn submit(
        &self,
        input: ParticipantInput,
        event_ids: Vec<EventId>,
        amount: Money,
    ) -> Result<OrderConfirmation, ServiceError> {
        let started = Instant::now();
        let phone = input.validate()?;
        if !amount.is_positive() {
            return Err(ValidationError::Invalid {
                field: "amount",
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        let mut order: Option<Order> = None;
        let mut last_conflict: Option<StoreError> = None;

        for attempt in 0..=self.settings.max_conflict_retries {
            let snapshot = self.store.find_by_phone(&phone).await?;
            let existing = snapshot
                .as_ref()
                .map_or(&[][..], |s| s.participant.registrations.as_slice());

            if let Decision::Reject(reason) = self.admission.evaluate(existing, &event_ids) {
                tracing::info!(%phone, attempt, reason = reason.code(), "Registration rejected");
                RegistrationMetrics::record_rejected(reason.code());
                if let Some(orphan) = &order {
                    tracing::warn!(%phone, order_id = %orphan.id, "Order left unreferenced after concurrent registration");
                }
                return Err(reason.into());
            }

            let current_order = match &order {
                Some(existing_order) => existing_order.clone(),
                None => {
                    let created = self.create_order(&input, &phone, &event_ids, amount).await?;
                    order.insert(created).clone()
                },
            };

            let now = self.clock.now();
            let mut tx = ParticipantTransaction::begin_or_create(snapshot, || {
                input.clone().into_participant(phone.clone(), now)
            });
            tx.append_registrations(&self.admission, &event_ids, &current_order.id, amount, now)?;

            match tx.commit(self.store.as_ref()).await {
                Ok(version) => {
                    if let Some(cache) = &self.cache {
                        cache.invalidate(&phone);
                    }
                    tracing::info!(
                        %phone,
                        order_id = %current_order.id,
                        %version,
                        events = event_ids.len(),
                        "Registration batch persisted as pending"
                    );
                    RegistrationMetrics::record_submitted(started.elapsed());
                    return Ok(OrderConfirmation {
                        order_id: current_order.id,
                        amount: current_order.amount,
                        currency: current_order.currency,
                    });
                },
                Err(err) if err.is_conflict() => {
                    tracing::debug!(%phone, attempt, error = %err, "Participant changed concurrently, re-reading");
                    StoreMetrics::record_conflict();
                    last_conflict = Some(err);
                },
                Err(err) => return Err(err.into()),
            }
        }

        tracing::error!(%phone, "Registration gave up after repeated conflicts");
        Err(ServiceError::Persistence(last_conflict.unwrap_or_else(|| StoreError::Conflict {
            phone,
            expected: None,
            actual: None,
        })))
    }

    async fn create_order(
        &self,
        input: &ParticipantInput,
        phone: &Phone,
        event_ids: &[EventId],
        amount: Money,
    ) -> Result<Order, GatewayError> {
        let request = OrderRequest {
            amount,
            currency: self.settings.currency.clone(),
            receipt: format!("receipt_order_{}", self.clock.now().timestamp_millis()),
            notes: OrderNotes {
                phone: phone.clone(),
                name: input.name.trim().to_string(),
                college: input.organization.trim().to_string(),
                usn: input.institutional_id.trim().to_string(),
                registrations: event_ids
                    .iter()
                    .map(|event_id| NoteRegistration {
                        event_id: event_id.clone(),
                    })
                    .collect(),
            },
        };

        let order = retry_with_predicate(
            &self.retry,
            "create_order",
            || self.gateway.create_order(request.clone()),
            GatewayError::is_retryable,
        )
        .await?;

        tracing::debug!(%phone, order_id = %order.id, amount = %order.amount, "Payment order created");
        Ok(order)
    }
}
