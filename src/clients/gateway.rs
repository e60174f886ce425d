use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

/// Correlation data embedded in the hosted session; the gateway echoes it
/// back in webhook events.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub purchase_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSession {
    pub session_id: String,
    pub payment_url: String,
}

/// Hosted payment-session provider, specified at its interface only.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError>;
}

/// Reqwest-backed implementation talking to the hosted checkout API.
pub struct HostedCheckoutGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HostedCheckoutGateway {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct SessionPayload<'a> {
    amount: Decimal,
    currency: &'a str,
    line_items: &'a [SessionLineItem],
    metadata: SessionMetadata<'a>,
}

#[derive(Serialize)]
struct SessionMetadata<'a> {
    order_id: Uuid,
    customer_id: Uuid,
    purchase_number: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let payload = SessionPayload {
            amount: request.amount,
            currency: &request.currency,
            line_items: &request.line_items,
            metadata: SessionMetadata {
                order_id: request.order_id,
                customer_id: request.customer_id,
                purchase_number: &request.purchase_number,
            },
        };

        let mut builder = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("gateway session request failed: {e}"))
        })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway session request returned {}",
                response.status()
            )));
        }

        let body: SessionResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("gateway session response malformed: {e}"))
        })?;

        Ok(PaymentSession {
            session_id: body.id,
            payment_url: body.url,
        })
    }
}
