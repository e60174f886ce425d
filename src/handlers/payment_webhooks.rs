use crate::{errors::ServiceError, AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{error, info};

/// POST /api/v1/payments/webhook
///
/// 200 for processed or deliberately-ignored events (including processing
/// errors, to prevent retry storms from the sender); 400 only for signature
/// verification failure.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event processed or acknowledged"),
        (status = 400, description = "Signature verification failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.services.payment_events.process(&headers, &body).await {
        Ok(disposition) => {
            info!(?disposition, "payment webhook acknowledged");
            (StatusCode::OK, "ok").into_response()
        }
        Err(err @ ServiceError::AuthError(_)) => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(err) => {
            // Authenticated but unprocessable; acknowledge so the gateway
            // does not retry indefinitely.
            error!(error = %err, "payment webhook processing failed; acknowledging");
            (StatusCode::OK, "ok").into_response()
        }
    }
}
