//! Liveness endpoint.

use axum::http::StatusCode;

/// Returns 200 OK while the process is serving requests.
///
/// Dependencies (database, gateway) are not checked.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
