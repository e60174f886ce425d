use crate::{
    auth::AuthenticatedUser,
    errors::ServiceError,
    services::checkout::{BeginCheckoutRequest, CheckoutResponse},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

/// POST /api/v1/checkout — creates an unpaid order and returns the hosted
/// payment session.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = BeginCheckoutRequest,
    responses(
        (status = 200, description = "Order created and session issued", body = CheckoutResponse),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable; the order stays unpaid and can be resumed", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn begin_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<BeginCheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .services
        .checkout
        .begin_checkout(user.id, request)
        .await?;
    Ok(Json(ApiResponse::ok(response)))
}

/// POST /api/v1/checkout/:order_id/session — fresh session for an unpaid
/// order after a gateway outage.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/{order_id}/session",
    responses(
        (status = 200, description = "New session issued", body = CheckoutResponse),
        (status = 409, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn resume_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    if order.customer_id != user.id {
        user.require_admin()?;
    }
    let response = state.services.checkout.resume_checkout(order_id).await?;
    Ok(Json(ApiResponse::ok(response)))
}
