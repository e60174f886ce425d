use crate::{services::shipment_events::CourierEvent, AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use tracing::{error, warn};

/// POST /api/v1/shipments/webhook
///
/// Authenticated with the shared courier API key. 403 on a bad or missing
/// key; 200 otherwise, even when no line items match the reference.
#[utoipa::path(
    post,
    path = "/api/v1/shipments/webhook",
    request_body = CourierEvent,
    responses(
        (status = 200, description = "Event recorded", body = crate::services::shipment_events::ShipmentEventSummary),
        (status = 403, description = "Bad or missing API key")
    ),
    tag = "Shipments"
)]
pub async fn shipment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if provided != Some(state.config.courier_api_key.as_str()) {
        warn!("shipment webhook rejected: bad or missing api key");
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }

    let event: CourierEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "shipment webhook payload malformed; acknowledging");
            return (StatusCode::OK, "ignored").into_response();
        }
    };

    match state.services.shipment_events.process(event).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => {
            error!(error = %err, "shipment webhook processing failed; acknowledging");
            (StatusCode::OK, "ignored").into_response()
        }
    }
}
