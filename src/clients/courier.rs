use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

/// One shipment request covers one vendor's line items within an order.
#[derive(Debug, Clone, Serialize)]
pub struct CreateShipmentRequest {
    pub order_id: Uuid,
    pub purchase_number: String,
    pub vendor_id: Uuid,
    pub recipient_address: Option<String>,
    pub pieces: Vec<ShipmentPiece>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentPiece {
    pub line_item_id: Uuid,
    pub description: String,
    pub quantity: i32,
}

/// Per-group response: a success flag and, on success, the courier reference
/// later used to correlate delivery events.
#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentAck {
    pub success: bool,
    pub reference_no: Option<String>,
    pub message: Option<String>,
}

/// Courier/shipment provider, specified at its interface only.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CourierApi: Send + Sync {
    async fn create_shipment(
        &self,
        request: CreateShipmentRequest,
    ) -> Result<ShipmentAck, ServiceError>;

    async fn cancel_shipment(&self, reference_no: &str) -> Result<(), ServiceError>;
}

/// Reqwest-backed courier client.
pub struct HttpCourierClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCourierClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }
}

#[derive(Deserialize)]
struct CancelResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl CourierApi for HttpCourierClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, vendor_id = %request.vendor_id))]
    async fn create_shipment(
        &self,
        request: CreateShipmentRequest,
    ) -> Result<ShipmentAck, ServiceError> {
        let response = self
            .http
            .post(format!("{}/v1/shipments", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("courier create failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "courier create returned {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("courier response malformed: {e}"))
        })
    }

    #[instrument(skip(self))]
    async fn cancel_shipment(&self, reference_no: &str) -> Result<(), ServiceError> {
        let response = self
            .http
            .post(format!(
                "{}/v1/shipments/{}/cancel",
                self.base_url, reference_no
            ))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("courier cancel failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "courier cancel returned {}",
                response.status()
            )));
        }

        let body: CancelResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("courier cancel response malformed: {e}"))
        })?;
        if !body.success {
            return Err(ServiceError::ExternalServiceError(format!(
                "courier declined cancellation: {}",
                body.message.unwrap_or_else(|| "no reason given".to_string())
            )));
        }
        Ok(())
    }
}
