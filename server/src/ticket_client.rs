//! HTTP client for the ticket rendering service.

use fest_core::BoxFuture;
use fest_core::ticket::{TicketError, TicketIssuer, TicketRequest};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// [`TicketIssuer`] that posts to `{base_url}/tickets` and reads back `{"url"}`.
#[derive(Clone)]
pub struct HttpTicketIssuer {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct IssuedTicket {
    url: String,
}

impl HttpTicketIssuer {
    /// Create a client for the rendering service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_ticket(&self, request: TicketRequest) -> Result<String, TicketError> {
        let response = self
            .client
            .post(format!("{}/tickets", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| TicketError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<IssuedTicket>()
                .await
                .map(|ticket| ticket.url)
                .map_err(|e| TicketError::Failed(format!("unreadable issuer response: {e}"))),
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                Err(TicketError::Unavailable(format!("ticket service returned {status}")))
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(TicketError::Failed(format!("{}: {body}", status.as_u16())))
            },
        }
    }
}

impl TicketIssuer for HttpTicketIssuer {
    fn issue(&self, request: TicketRequest) -> BoxFuture<'_, Result<String, TicketError>> {
        Box::pin(self.post_ticket(request))
    }
}
