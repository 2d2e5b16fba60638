//! # Fest Testing
//!
//! Testing utilities for fest registration.
//!
//! This crate provides:
//! - Mock implementations of the collaborator traits (gateway, ticket issuer)
//! - [`InMemoryParticipantStore`] with real compare-and-write semantics
//! - Fixtures and a signed webhook body builder
//!
//! ## Example
//!
//! ```ignore
//! use fest_testing::{InMemoryParticipantStore, MockPaymentGateway, test_clock};
//!
//! #[tokio::test]
//! async fn test_submit() {
//!     let store = Arc::new(InMemoryParticipantStore::new());
//!     let gateway = MockPaymentGateway::new();
//!     let service = RegistrationService::new(store, gateway.shared(), Arc::new(test_clock()), settings);
//!     service.submit(input, events, amount).await.unwrap();
//!     assert_eq!(gateway.calls(), 1);
//! }
//! ```

pub mod fixtures;
pub mod store;

/// Mock implementations of the collaborator traits.
pub mod mocks {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::missing_panics_doc)]

    use chrono::{DateTime, Utc};
    use fest_core::BoxFuture;
    use fest_core::environment::Clock;
    use fest_core::gateway::{GatewayError, Order, OrderRequest, PaymentGateway};
    use fest_core::ticket::{TicketError, TicketIssuer, TicketRequest};
    use fest_core::types::OrderId;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use fest_testing::mocks::FixedClock;
    /// use fest_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    #[derive(Debug, Default)]
    struct GatewayState {
        requests: Vec<OrderRequest>,
        failures: VecDeque<GatewayError>,
    }

    /// Payment gateway that creates sequential orders (`order_test_1`, ...).
    ///
    /// Failures queued with [`MockPaymentGateway::fail_next`] are returned
    /// before any order is created.
    #[derive(Clone, Debug, Default)]
    pub struct MockPaymentGateway {
        state: Arc<Mutex<GatewayState>>,
        latency: Option<Duration>,
    }

    impl MockPaymentGateway {
        /// Creates a gateway that always succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Sleep for `latency` inside every call.
        #[must_use]
        pub const fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// Shared handle for injection.
        #[must_use]
        pub fn shared(&self) -> Arc<dyn PaymentGateway> {
            Arc::new(self.clone())
        }

        /// Return `error` from the next `count` calls.
        pub fn fail_next(&self, count: usize, error: &GatewayError) {
            let mut state = self.state.lock().unwrap();
            state.failures.extend(std::iter::repeat_n(error.clone(), count));
        }

        /// Number of `create_order` calls, failed ones included.
        #[must_use]
        pub fn calls(&self) -> usize {
            let state = self.state.lock().unwrap();
            state.requests.len()
        }

        /// Requests received so far.
        #[must_use]
        pub fn requests(&self) -> Vec<OrderRequest> {
            self.state.lock().unwrap().requests.clone()
        }
    }

    impl PaymentGateway for MockPaymentGateway {
        fn create_order(&self, request: OrderRequest) -> BoxFuture<'_, Result<Order, GatewayError>> {
            Box::pin(async move {
                if let Some(latency) = self.latency {
                    tokio::time::sleep(latency).await;
                }

                let mut state = self.state.lock().unwrap();
                state.requests.push(request.clone());
                if let Some(error) = state.failures.pop_front() {
                    return Err(error);
                }
                let id = OrderId::new(format!("order_test_{}", state.requests.len()));
                tracing::debug!(order_id = %id, amount = %request.amount, "Mock order created");
                Ok(Order {
                    id,
                    amount: request.amount,
                    currency: request.currency,
                })
            })
        }
    }

    #[derive(Debug, Default)]
    struct IssuerState {
        requests: Vec<TicketRequest>,
        failures: VecDeque<TicketError>,
        always_fail: Option<TicketError>,
    }

    /// Ticket issuer returning `https://tickets.test/<order_id>.png`.
    #[derive(Clone, Debug, Default)]
    pub struct MockTicketIssuer {
        state: Arc<Mutex<IssuerState>>,
    }

    impl MockTicketIssuer {
        /// Creates an issuer that always succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Shared handle for injection.
        #[must_use]
        pub fn shared(&self) -> Arc<dyn TicketIssuer> {
            Arc::new(self.clone())
        }

        /// Return `error` from the next `count` calls.
        pub fn fail_next(&self, count: usize, error: &TicketError) {
            let mut state = self.state.lock().unwrap();
            state.failures.extend(std::iter::repeat_n(error.clone(), count));
        }

        /// Fail every call with `error` until [`MockTicketIssuer::recover`].
        pub fn fail_always(&self, error: TicketError) {
            self.state.lock().unwrap().always_fail = Some(error);
        }

        /// Stop failing.
        pub fn recover(&self) {
            let mut state = self.state.lock().unwrap();
            state.always_fail = None;
            state.failures.clear();
        }

        /// Number of `issue` calls, failed ones included.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.state.lock().unwrap().requests.len()
        }

        /// Requests received so far.
        #[must_use]
        pub fn requests(&self) -> Vec<TicketRequest> {
            self.state.lock().unwrap().requests.clone()
        }

        /// URL the issuer returns for `order_id`.
        #[must_use]
        pub fn url_for(order_id: &str) -> String {
            format!("https://tickets.test/{order_id}.png")
        }
    }

    impl TicketIssuer for MockTicketIssuer {
        fn issue(&self, request: TicketRequest) -> BoxFuture<'_, Result<String, TicketError>> {
            Box::pin(async move {
                let mut state = self.state.lock().unwrap();
                state.requests.push(request.clone());
                if let Some(error) = state.always_fail.clone() {
                    return Err(error);
                }
                if let Some(error) = state.failures.pop_front() {
                    return Err(error);
                }
                Ok(Self::url_for(request.order_id.as_str()))
            })
        }
    }
}

pub use mocks::{FixedClock, MockPaymentGateway, MockTicketIssuer, test_clock};
pub use store::InMemoryParticipantStore;
