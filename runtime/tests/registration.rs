//! Registration intent service tests.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Harness, MAX_EVENTS};
use fest_core::admission::AdmissionRejection;
use fest_core::error::{ServiceError, ValidationError};
use fest_core::gateway::GatewayError;
use fest_core::status::RegistrationStatus;
use fest_core::types::{EventId, Money};
use fest_testing::MockPaymentGateway;
use fest_testing::fixtures::{event_ids, participant, participant_input, pending, registration};
use std::time::Duration;

const PHONE: &str = "9876543210";

#[tokio::test]
async fn test_submit_persists_pending_batch() {
    let h = Harness::new();

    let confirmation = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1", "e2"]), Money::from_major(300))
        .await
        .unwrap();

    assert_eq!(confirmation.order_id.as_str(), "order_test_1");
    assert_eq!(confirmation.amount, Money::from_major(300));
    assert_eq!(confirmation.currency, "INR");

    let stored = h.store.get(PHONE).unwrap();
    assert_eq!(stored.name, "Asha Rao");
    assert_eq!(stored.registrations.len(), 2);
    assert!(stored
        .registrations
        .iter()
        .all(|r| r.status == RegistrationStatus::Pending && r.order_id == confirmation.order_id));
}

#[tokio::test]
async fn test_order_notes_carry_participant_and_events() {
    let h = Harness::new();
    h.registration
        .submit(participant_input(PHONE), event_ids(&["e1", "e2"]), Money::from_major(300))
        .await
        .unwrap();

    let request = h.gateway.requests().remove(0);
    assert_eq!(request.amount.minor(), 30_000);
    assert!(request.receipt.starts_with("receipt_order_"));
    assert_eq!(request.notes.phone.as_str(), PHONE);
    assert_eq!(request.notes.college, "City College");
    assert_eq!(request.notes.usn, "1XY21CS001");
    assert_eq!(request.notes.event_ids(), event_ids(&["e1", "e2"]));
}

#[tokio::test]
async fn test_fifth_event_is_rejected_at_cap() {
    let h = Harness::new();
    let mut existing = participant(PHONE);
    existing.registrations = vec![
        pending("e1", "order_a"),
        pending("e2", "order_a"),
        registration("e3", "order_b", RegistrationStatus::Paid),
        registration("e4", "order_b", RegistrationStatus::Paid),
    ];
    h.store.seed(existing);

    let err = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e5"]), Money::from_major(100))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::AdmissionRejected(AdmissionRejection::CapExceeded { max_events: 4, .. })
    ));
    assert!(err.to_string().contains('4'));
    assert_eq!(h.gateway.calls(), 0);
    assert_eq!(h.store.get(PHONE).unwrap().registrations.len(), 4);
}

#[tokio::test]
async fn test_duplicate_active_event_names_the_event() {
    let h = Harness::new();
    let mut existing = participant(PHONE);
    existing.registrations = vec![pending("hackathon", "order_a")];
    h.store.seed(existing);

    let err = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["quiz", "hackathon"]), Money::from_major(100))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::AdmissionRejected(AdmissionRejection::DuplicateEvent { .. })));
    assert!(err.to_string().contains("hackathon"));
}

#[tokio::test]
async fn test_failed_registrations_free_their_slot() {
    let h = Harness::new();
    let mut existing = participant(PHONE);
    existing.registrations = vec![
        registration("e1", "order_a", RegistrationStatus::Failed),
        pending("e2", "order_b"),
        pending("e3", "order_b"),
        pending("e4", "order_b"),
    ];
    h.store.seed(existing);

    h.registration
        .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_major(100))
        .await
        .unwrap();

    let stored = h.store.get(PHONE).unwrap();
    assert_eq!(stored.active_registrations().count(), MAX_EVENTS);
    assert_eq!(stored.registrations.len(), 5);
}

#[tokio::test]
async fn test_validation_runs_before_gateway() {
    let h = Harness::new();
    let mut input = participant_input(PHONE);
    input.name = "  ".to_string();

    let err = h
        .registration
        .submit(input, event_ids(&["e1"]), Money::from_major(100))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ValidationError::MissingField("name"))));

    let err = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_minor(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ValidationError::Invalid { field: "amount", .. })));

    assert_eq!(h.gateway.calls(), 0);
    assert_eq!(h.store.find_calls(), 0);
}

#[tokio::test]
async fn test_transient_gateway_failures_are_retried() {
    let h = Harness::new();
    h.gateway.fail_next(2, &GatewayError::Unavailable("502".to_string()));

    let confirmation = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_major(100))
        .await
        .unwrap();

    assert_eq!(h.gateway.calls(), 3);
    assert_eq!(confirmation.order_id.as_str(), "order_test_3");
}

#[tokio::test]
async fn test_gateway_failure_leaves_nothing_behind() {
    let h = Harness::new();
    h.gateway.fail_next(3, &GatewayError::Timeout);

    let err = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_major(100))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Gateway(GatewayError::Timeout)));
    assert_eq!(h.gateway.calls(), 3);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_rejected_order_is_not_retried() {
    let h = Harness::new();
    h.gateway.fail_next(1, &GatewayError::Rejected("bad amount".to_string()));

    let err = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_major(100))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Gateway(GatewayError::Rejected(_))));
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test]
async fn test_conflict_reuses_the_order() {
    let h = Harness::new();
    h.store.seed(participant(PHONE));
    h.store.force_conflicts(2);

    let confirmation = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_major(100))
        .await
        .unwrap();

    assert_eq!(h.gateway.calls(), 1);
    assert_eq!(h.store.find_calls(), 3);
    let stored = h.store.get(PHONE).unwrap();
    assert_eq!(stored.registrations[0].order_id, confirmation.order_id);
}

#[tokio::test]
async fn test_conflicts_beyond_budget_surface_as_persistence() {
    let h = Harness::new();
    h.store.seed(participant(PHONE));
    h.store.force_conflicts(100);

    let err = h
        .registration
        .submit(participant_input(PHONE), event_ids(&["e1"]), Money::from_major(100))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Persistence(ref e) if e.is_conflict()));
    assert!(h.store.get(PHONE).unwrap().registrations.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submits_never_exceed_cap() {
    let h = Harness::with_gateway(MockPaymentGateway::new().with_latency(Duration::from_millis(5)));
    let mut existing = participant(PHONE);
    existing.registrations = vec![pending("e0", "order_a"), pending("e1", "order_a")];
    h.store.seed(existing);

    let handles: Vec<_> = (2..12)
        .map(|n| {
            let service = h.registration.clone();
            tokio::spawn(async move {
                service
                    .submit(
                        participant_input(PHONE),
                        vec![EventId::new(format!("e{n}"))],
                        Money::from_major(100),
                    )
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let capped = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(ServiceError::AdmissionRejected(AdmissionRejection::CapExceeded { .. }))
            )
        })
        .count();

    assert_eq!(accepted, 2);
    assert_eq!(capped, 8);

    let stored = h.store.get(PHONE).unwrap();
    assert_eq!(stored.active_registrations().count(), MAX_EVENTS);
    assert!(stored.duplicate_active_events().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_submits_both_land() {
    let h = Harness::with_gateway(MockPaymentGateway::new().with_latency(Duration::from_millis(2)));

    let first = {
        let service = h.registration.clone();
        tokio::spawn(async move {
            service
                .submit(participant_input(PHONE), event_ids(&["e1", "e2"]), Money::from_major(200))
                .await
        })
    };
    let second = {
        let service = h.registration.clone();
        tokio::spawn(async move {
            service
                .submit(participant_input(PHONE), event_ids(&["e3", "e4"]), Money::from_major(200))
                .await
        })
    };

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(h.store.get(PHONE).unwrap().registrations.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_event_admits_once() {
    let h = Harness::with_gateway(MockPaymentGateway::new().with_latency(Duration::from_millis(2)));
    h.store.seed(participant(PHONE));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let service = h.registration.clone();
            tokio::spawn(async move {
                service
                    .submit(participant_input(PHONE), event_ids(&["hackathon"]), Money::from_major(100))
                    .await
            })
        })
        .collect();

    let accepted = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(accepted, 1);
    let stored = h.store.get(PHONE).unwrap();
    assert_eq!(stored.active_registrations().count(), 1);
}
