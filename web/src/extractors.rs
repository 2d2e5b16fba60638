//! Custom Axum extractors.

use crate::middleware::{CORRELATION_ID_HEADER, parse_correlation_id};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Prefers the id assigned by [`crate::middleware::correlation_id_layer`];
/// without the layer it reads `X-Correlation-ID` or generates a UUID v4.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .or_else(|| parse_correlation_id(parts.headers.get(CORRELATION_ID_HEADER)))
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}
