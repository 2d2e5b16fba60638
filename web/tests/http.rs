//! HTTP surface tests against in-memory collaborators.

#![allow(clippy::unwrap_used)]

use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use fest_core::ParticipantStore;
use fest_core::settings::FestSettings;
use fest_core::status::RegistrationStatus;
use fest_core::webhook::SIGNATURE_HEADER;
use fest_runtime::{
    ParticipantCache, ParticipantDirectory, Reconciler, RegistrationService, RetryPolicy,
    TicketService,
};
use fest_testing::fixtures::{TEST_WEBHOOK_SECRET, WebhookBuilder, participant, pending, registration, sign};
use fest_testing::{InMemoryParticipantStore, MockPaymentGateway, MockTicketIssuer, test_clock};
use fest_web::{AppState, CORRELATION_ID_HEADER, WebhookTasks, router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const PHONE: &str = "9876543210";

struct TestApp {
    server: TestServer,
    store: InMemoryParticipantStore,
    gateway: MockPaymentGateway,
    tasks: Arc<WebhookTasks>,
}

fn app() -> TestApp {
    let store = InMemoryParticipantStore::new().with_max_active(4);
    let gateway = MockPaymentGateway::new();
    let issuer = MockTicketIssuer::new();
    let cache = Arc::new(ParticipantCache::new(Duration::from_secs(30)));
    let settings = FestSettings::default();
    let store_handle: Arc<dyn ParticipantStore> = Arc::new(store.clone());
    let clock = Arc::new(test_clock());
    let retry = RetryPolicy::builder()
        .base_delay(Duration::from_millis(1))
        .jitter(0.0)
        .build();

    let registration = RegistrationService::new(
        Arc::clone(&store_handle),
        gateway.shared(),
        clock.clone(),
        settings.clone(),
    )
    .with_retry_policy(retry.clone())
    .with_cache(Arc::clone(&cache));
    let tickets = Arc::new(
        TicketService::new(
            Arc::clone(&store_handle),
            issuer.shared(),
            retry,
            settings.max_conflict_retries,
        )
        .with_cache(Arc::clone(&cache)),
    );
    let reconciler = Reconciler::new(
        Arc::clone(&store_handle),
        gateway.shared(),
        tickets,
        clock,
        settings,
        TEST_WEBHOOK_SECRET,
    )
    .with_cache(Arc::clone(&cache));
    let directory = ParticipantDirectory::new(store_handle, cache);

    let state = AppState::new(
        Arc::new(registration),
        Arc::new(reconciler),
        Arc::new(directory),
    );

    let tasks = Arc::clone(&state.tasks);

    TestApp {
        server: TestServer::new(router(state)).unwrap(),
        store,
        gateway,
        tasks,
    }
}

fn form(events: &[&str]) -> Value {
    json!({
        "name": "Asha Rao",
        "usn": "1XY21CS001",
        "phone": PHONE,
        "college": "City College",
        "registrations": events.iter().map(|e| json!({ "event_id": e })).collect::<Vec<_>>(),
        "amount": 100 * events.len(),
    })
}

fn signature_header() -> HeaderName {
    HeaderName::from_bytes(SIGNATURE_HEADER.as_bytes()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn test_registration_returns_order() {
    let app = app();
    let response = app.server.post("/registration").json(&form(&["e1", "e2"])).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["order_id"], "order_test_1");
    assert_eq!(body["amount"], 20_000);
    assert_eq!(body["currency"], "INR");
    assert!(!response.header(CORRELATION_ID_HEADER).is_empty());
    assert_eq!(app.store.get(PHONE).unwrap().registrations.len(), 2);
}

#[tokio::test]
async fn test_cap_rejection_is_distinguishable() {
    let app = app();
    let mut existing = participant(PHONE);
    existing.registrations = (1..=4).map(|n| pending(&format!("e{n}"), "order_a")).collect();
    app.store.seed(existing);

    let response = app.server.post("/registration").json(&form(&["e5"])).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "EVENT_CAP_REACHED");
    assert_eq!(app.gateway.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_event_names_the_event() {
    let app = app();
    let mut existing = participant(PHONE);
    existing.registrations = vec![pending("hackathon", "order_a")];
    app.store.seed(existing);

    let response = app.server.post("/registration").json(&form(&["hackathon"])).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "DUPLICATE_EVENT");
    assert!(body["message"].as_str().unwrap().contains("hackathon"));
}

#[tokio::test]
async fn test_missing_field_is_a_validation_error() {
    let app = app();
    let mut request = form(&["e1"]);
    request["college"] = json!("");

    let response = app.server.post("/registration").json(&request).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["message"].as_str().unwrap().contains("college"));
}

#[tokio::test]
async fn test_unreadable_json_is_a_bad_request() {
    let app = app();
    let response = app
        .server
        .post("/registration")
        .json(&json!({ "name": "Asha Rao" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_empty_selection_is_rejected() {
    let app = app();
    let mut request = form(&[]);
    request["amount"] = json!(100);

    let response = app.server.post("/registration").json(&request).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "NO_EVENTS_REQUESTED");
}

#[tokio::test]
async fn test_webhook_with_bad_signature_touches_nothing() {
    let app = app();
    app.store.seed(participant(PHONE));
    let body = WebhookBuilder::captured("order_a", PHONE).build();

    let response = app
        .server
        .post("/payment-webhook")
        .add_header(signature_header(), HeaderValue::from_static("deadbeef"))
        .bytes(Bytes::from(body))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["code"], "INVALID_SIGNATURE");
    assert_eq!(app.store.find_calls(), 0);
}

#[tokio::test]
async fn test_webhook_without_signature_is_rejected() {
    let app = app();
    let body = WebhookBuilder::captured("order_a", PHONE).build();

    let response = app.server.post("/payment-webhook").bytes(Bytes::from(body)).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(app.tasks.is_empty());
    assert_eq!(app.store.find_calls(), 0);
}

#[tokio::test]
async fn test_signed_garbage_is_malformed() {
    let app = app();
    let body = b"{\"event\":\"payment.captured\"}".to_vec();
    let signature = sign(&body);

    let response = app
        .server
        .post("/payment-webhook")
        .add_header(signature_header(), HeaderValue::from_str(&signature).unwrap())
        .bytes(Bytes::from(body))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["code"], "MALFORMED_PAYLOAD");
}

#[tokio::test]
async fn test_webhook_is_accepted_then_applied() {
    let app = app();
    let confirmation: Value = app
        .server
        .post("/registration")
        .json(&form(&["e1"]))
        .await
        .json();
    let order_id = confirmation["order_id"].as_str().unwrap().to_string();

    let body = WebhookBuilder::captured(&order_id, PHONE).build();
    let signature = sign(&body);
    let response = app
        .server
        .post("/payment-webhook")
        .add_header(signature_header(), HeaderValue::from_str(&signature).unwrap())
        .bytes(Bytes::from(body))
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({ "status": "accepted" }));

    assert_eq!(app.tasks.drain().await, 1);
    let stored = app.store.get(PHONE).unwrap();
    assert_eq!(stored.registrations[0].status, RegistrationStatus::Paid);
    assert!(stored.registrations[0].ticket_url.is_some());
    assert!(app.tasks.is_empty());
}

#[tokio::test]
async fn test_participant_lookup() {
    let app = app();
    app.server
        .get("/participants/0000000000")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let mut existing = participant(PHONE);
    existing.registrations = vec![pending("e1", "order_a")];
    app.store.seed(existing);

    let response = app.server.get(&format!("/participants/{PHONE}")).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["phone"], PHONE);
    assert_eq!(body["registrations"][0]["status"], "pending");
}

#[tokio::test]
async fn test_only_paid_registrations_verify() {
    let app = app();
    let mut existing = participant(PHONE);
    existing.registrations = vec![
        pending("e1", "order_a"),
        registration("e2", "order_b", RegistrationStatus::Paid),
        registration("e3", "order_c", RegistrationStatus::Failed),
    ];
    app.store.seed(existing);

    app.server
        .get(&format!("/verify/{PHONE}/e2"))
        .await
        .assert_status_ok();
    app.server
        .get(&format!("/verify/{PHONE}/e1"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .get(&format!("/verify/{PHONE}/e3"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
