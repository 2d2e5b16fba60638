//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the registration pipeline:
//! - Registration submissions and rejections
//! - Payment reconciliation outcomes, duplicates and anomalies
//! - Ticket issuance
//! - Store conflicts and gateway/issuer retries
//!
//! # Example
//!
//! ```rust,no_run
//! use fest_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! let body = server.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder plus the address it is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint is bound to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should be served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests) this logs a warning
    /// and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder wasn't installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "registrations_submitted_total",
        "Registration batches accepted and persisted as pending"
    );
    describe_counter!(
        "registrations_rejected_total",
        "Registration batches refused, labelled by reason"
    );
    describe_histogram!(
        "registration_submit_duration_seconds",
        "Time taken to admit, create an order and persist a batch"
    );

    describe_counter!(
        "reconciliations_applied_total",
        "Payment events that changed registration status, labelled by outcome"
    );
    describe_counter!(
        "reconciliations_duplicate_total",
        "Payment events recognised as redeliveries"
    );
    describe_counter!(
        "reconciliations_anomaly_total",
        "Payment events conflicting with an earlier terminal outcome"
    );
    describe_counter!(
        "reconciliations_orphaned_total",
        "Payment events that could not be tied to any registration"
    );

    describe_counter!("tickets_issued_total", "Ticket artifacts issued and attached");
    describe_counter!(
        "tickets_failed_total",
        "Ticket issuances that failed and were left for backfill"
    );

    describe_counter!(
        "store_conflicts_total",
        "Compare-and-write conflicts that forced a re-read"
    );
    describe_counter!("retry_attempts_total", "Retries of gateway or issuer calls");
    describe_counter!(
        "retry_exhausted_total",
        "Gateway or issuer calls that exhausted their retry budget"
    );
}

/// Registration metrics recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record a persisted batch.
    pub fn record_submitted(duration: Duration) {
        counter!("registrations_submitted_total").increment(1);
        histogram!("registration_submit_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a refused batch.
    pub fn record_rejected(reason: &'static str) {
        counter!("registrations_rejected_total", "reason" => reason).increment(1);
    }
}

/// Reconciliation metrics recorder.
pub struct ReconciliationMetrics;

impl ReconciliationMetrics {
    /// Record an applied status transition.
    pub fn record_applied(outcome: &'static str) {
        counter!("reconciliations_applied_total", "outcome" => outcome).increment(1);
    }

    /// Record a redelivered event.
    pub fn record_duplicate() {
        counter!("reconciliations_duplicate_total").increment(1);
    }

    /// Record a conflicting event.
    pub fn record_anomaly() {
        counter!("reconciliations_anomaly_total").increment(1);
    }

    /// Record an orphaned payment.
    pub fn record_orphaned() {
        counter!("reconciliations_orphaned_total").increment(1);
    }
}

/// Ticket metrics recorder.
pub struct TicketMetrics;

impl TicketMetrics {
    /// Record an issued and attached ticket.
    pub fn record_issued() {
        counter!("tickets_issued_total").increment(1);
    }

    /// Record a failed issuance.
    pub fn record_failed() {
        counter!("tickets_failed_total").increment(1);
    }
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record a compare-and-write conflict.
    pub fn record_conflict() {
        counter!("store_conflicts_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt(operation: &'static str) {
        counter!("retry_attempts_total", "operation" => operation).increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted(operation: &'static str) {
        counter!("retry_exhausted_total", "operation" => operation).increment(1);
    }
}
