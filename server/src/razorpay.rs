//! Razorpay orders API client.

use fest_core::BoxFuture;
use fest_core::gateway::{GatewayError, Order, OrderRequest, PaymentGateway};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

/// [`PaymentGateway`] backed by the Razorpay REST API.
///
/// Orders are created with `POST {base_url}/orders` using HTTP basic auth
/// with the key id and secret. Webhook signatures use the default HMAC check.
#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: &'a fest_core::gateway::OrderNotes,
}

impl RazorpayGateway {
    /// Create a client for `base_url` (e.g. `https://api.razorpay.com/v1`).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_order(&self, request: OrderRequest) -> Result<Order, GatewayError> {
        let body = CreateOrderBody {
            amount: request.amount.minor(),
            currency: &request.currency,
            receipt: &request.receipt,
            notes: &request.notes,
        };

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let order = response
                    .json::<Order>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
                tracing::debug!(order_id = %order.id, amount = %order.amount, "Razorpay order created");
                Ok(order)
            },
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                Err(GatewayError::Unavailable(format!("razorpay returned {status}")))
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::Rejected(format!("{}: {body}", status.as_u16())))
            },
        }
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(err.to_string())
    }
}

impl PaymentGateway for RazorpayGateway {
    fn create_order(&self, request: OrderRequest) -> BoxFuture<'_, Result<Order, GatewayError>> {
        Box::pin(self.post_order(request))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fest_core::gateway::{NoteRegistration, OrderNotes};
    use fest_core::types::{EventId, Money, Phone};
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> OrderRequest {
        OrderRequest {
            amount: Money::from_major(200),
            currency: "INR".to_string(),
            receipt: "receipt_order_1".to_string(),
            notes: OrderNotes {
                phone: Phone::new("9876543210"),
                name: "Asha Rao".to_string(),
                college: "City College".to_string(),
                usn: "1XY21CS001".to_string(),
                registrations: vec![NoteRegistration {
                    event_id: EventId::new("e1"),
                }],
            },
        }
    }

    async fn gateway(server: &MockServer) -> RazorpayGateway {
        RazorpayGateway::new("rzp_key", "rzp_secret", server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_create_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(basic_auth("rzp_key", "rzp_secret"))
            .and(body_partial_json(json!({
                "amount": 20_000,
                "currency": "INR",
                "receipt": "receipt_order_1",
                "notes": { "phone": "9876543210", "registrations": [{ "event_id": "e1" }] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_abc",
                "amount": 20_000,
                "currency": "INR",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = gateway(&server).await.create_order(request()).await.unwrap();
        assert_eq!(order.id.as_str(), "order_abc");
        assert_eq!(order.amount, Money::from_major(200));
    }

    #[tokio::test]
    async fn test_server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(&server).await.create_order(request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("amount too small"))
            .mount(&server)
            .await;

        let err = gateway(&server).await.create_order(request()).await.unwrap_err();
        assert!(matches!(&err, GatewayError::Rejected(msg) if msg.contains("amount too small")));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unexpected_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = gateway(&server).await.create_order(request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }
}
