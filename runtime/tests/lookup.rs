//! Participant lookup, entry verification and cache invalidation.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use fest_core::BoxFuture;
use fest_core::status::RegistrationStatus;
use fest_core::store::{ParticipantStore, PendingTicket, StoreError, StoredParticipant, Version};
use fest_core::types::{EventId, Money, Participant, Phone};
use fest_runtime::ParticipantDirectory;
use fest_testing::fixtures::{WebhookBuilder, event_ids, participant, participant_input, sign};
use std::sync::Arc;
use tokio::sync::Notify;

const PHONE: &str = "9876543210";

#[tokio::test]
async fn test_lookup_is_cached_until_a_write() {
    let h = Harness::new();
    let phone = Phone::new(PHONE);
    assert!(h.directory.get(&phone).await.unwrap().is_none());

    let confirmation = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_major(100))
        .await
        .unwrap();

    let first = h.directory.get(&phone).await.unwrap().unwrap();
    let finds = h.store.find_calls();
    let second = h.directory.get(&phone).await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(h.store.find_calls(), finds);
    assert_eq!(h.cache.len(), 1);

    let body = WebhookBuilder::captured(confirmation.order_id.as_str(), PHONE).build();
    h.reconciler.reconcile(&body, &sign(&body)).await.unwrap();

    let after = h.directory.get(&phone).await.unwrap().unwrap();
    assert_eq!(after.registrations[0].status, RegistrationStatus::Paid);
    assert!(after.registrations[0].ticket_url.is_some());
}

#[tokio::test]
async fn test_only_paid_registrations_admit_entry() {
    let h = Harness::new();
    let phone = Phone::new(PHONE);
    let confirmation = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1", "e2"]), Money::from_major(200))
        .await
        .unwrap();

    assert!(h.directory.verify(&phone, &EventId::new("e1")).await.unwrap().is_none());

    let body = WebhookBuilder::captured(confirmation.order_id.as_str(), PHONE).build();
    h.reconciler.reconcile(&body, &sign(&body)).await.unwrap();

    let admitted = h.directory.verify(&phone, &EventId::new("e1")).await.unwrap();
    assert_eq!(admitted.map(|r| r.status), Some(RegistrationStatus::Paid));
    assert!(h.directory.verify(&phone, &EventId::new("e9")).await.unwrap().is_none());
    assert!(h
        .directory
        .verify(&Phone::new("0000000000"), &EventId::new("e1"))
        .await
        .unwrap()
        .is_none());
}

/// Holds every read open after it has taken its snapshot until released.
struct HeldReads {
    inner: Arc<dyn ParticipantStore>,
    read: Arc<Notify>,
    release: Arc<Notify>,
}

impl ParticipantStore for HeldReads {
    fn find_by_phone(
        &self,
        phone: &Phone,
    ) -> BoxFuture<'_, Result<Option<StoredParticipant>, StoreError>> {
        let phone = phone.clone();
        Box::pin(async move {
            let snapshot = self.inner.find_by_phone(&phone).await;
            self.read.notify_one();
            self.release.notified().await;
            snapshot
        })
    }

    fn create(&self, participant: Participant) -> BoxFuture<'_, Result<Version, StoreError>> {
        self.inner.create(participant)
    }

    fn save(
        &self,
        participant: Participant,
        expected: Version,
    ) -> BoxFuture<'_, Result<Version, StoreError>> {
        self.inner.save(participant, expected)
    }

    fn list_ticket_pending(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<PendingTicket>, StoreError>> {
        self.inner.list_ticket_pending(limit)
    }
}

#[tokio::test]
async fn test_read_overlapping_a_write_is_not_cached() {
    let h = Harness::new();
    let phone = Phone::new(PHONE);
    h.store.seed(participant(PHONE));

    let read = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let held = ParticipantDirectory::new(
        Arc::new(HeldReads {
            inner: Arc::new(h.store.clone()),
            read: Arc::clone(&read),
            release: Arc::clone(&release),
        }),
        Arc::clone(&h.cache),
    );

    let (stale, ()) = tokio::join!(held.get(&phone), async {
        read.notified().await;
        h.registration
            .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_major(100))
            .await
            .unwrap();
        release.notify_one();
    });

    assert!(stale.unwrap().unwrap().registrations.is_empty());
    assert!(h.cache.get(&phone).is_none());

    let fresh = h.directory.get(&phone).await.unwrap().unwrap();
    assert_eq!(fresh.registrations.len(), 1);
    assert_eq!(h.cache.get(&phone).map(|s| s.participant.registrations.len()), Some(1));
}
