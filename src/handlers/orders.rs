use crate::{
    auth::{AuthenticatedUser, UserRole},
    entities::{line_item, order, OrderStatus},
    errors::ServiceError,
    services::shipping::{CancelOutcome, DispatchOutcome},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub purchase_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_session_id: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_items: Option<Vec<LineItemResponse>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineItemResponse {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub status: crate::entities::LineItemStatus,
    pub courier_reference: Option<String>,
    pub settled: bool,
    pub last_event_desc: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub hub_name: Option<String>,
    pub rider_name: Option<String>,
    pub failure_reason: Option<String>,
    pub pod_image: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub status: Option<OrderStatus>,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

pub fn order_to_response(
    model: order::Model,
    items: Option<Vec<line_item::Model>>,
) -> OrderResponse {
    OrderResponse {
        id: model.id,
        purchase_number: model.purchase_number,
        customer_id: model.customer_id,
        status: model.status,
        subtotal: model.subtotal,
        shipping_amount: model.shipping_amount,
        tax_amount: model.tax_amount,
        total_amount: model.total_amount,
        currency: model.currency,
        payment_session_id: model.payment_session_id,
        shipping_address: model.shipping_address,
        billing_address: model.billing_address,
        created_at: model.created_at,
        updated_at: model.updated_at,
        line_items: items.map(|items| items.into_iter().map(item_to_response).collect()),
    }
}

fn item_to_response(model: line_item::Model) -> LineItemResponse {
    LineItemResponse {
        id: model.id,
        vendor_id: model.vendor_id,
        product_name: model.product_name,
        sku: model.sku,
        quantity: model.quantity,
        unit_price: model.unit_price,
        line_total: model.line_total,
        status: model.status,
        courier_reference: model.courier_reference,
        settled: model.settled,
        last_event_desc: model.last_event_desc,
        last_event_at: model.last_event_at,
        hub_name: model.hub_name,
        rider_name: model.rider_name,
        failure_reason: model.failure_reason,
        pod_image: model.pod_image,
    }
}

fn ensure_can_view(user: &AuthenticatedUser, order: &order::Model) -> Result<(), ServiceError> {
    if user.role == UserRole::Admin || user.id == order.customer_id {
        return Ok(());
    }
    Err(ServiceError::Forbidden(
        "not allowed to view this order".to_string(),
    ))
}

/// GET /api/v1/orders/:id
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    responses(
        (status = 200, description = "Order with line items", body = OrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    ensure_can_view(&user, &order)?;
    let items = state.services.orders.line_items(id).await?;
    Ok(Json(ApiResponse::ok(order_to_response(order, Some(items)))))
}

/// GET /api/v1/orders — admins see everything, customers their own orders.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses((status = 200, description = "Paginated orders", body = OrderListResponse)),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer_scope = match user.role {
        UserRole::Admin => None,
        _ => Some(user.id),
    };
    let (orders, total) = state
        .services
        .orders
        .list_orders(query.page, query.per_page, query.status, customer_scope)
        .await?;
    Ok(Json(ApiResponse::ok(OrderListResponse {
        orders: orders
            .into_iter()
            .map(|o| order_to_response(o, None))
            .collect(),
        total,
        page: query.page,
        per_page: query.per_page,
    })))
}

/// POST /api/v1/orders/:id/ship — admin trigger for the shipment saga.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/ship",
    responses(
        (status = 200, description = "All vendor groups shipped", body = DispatchOutcome),
        (status = 409, description = "Order not in a shippable state", body = crate::errors::ErrorResponse),
        (status = 502, description = "Courier failure; completed groups rolled back", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn ship_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let outcome = state.services.shipping.dispatch_order(id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/v1/orders/:id/cancel
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    responses(
        (status = 200, description = "Order cancelled; already-delivered items reported separately", body = CancelOutcome),
        (status = 409, description = "Order not cancellable", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let outcome = state.services.shipping.cancel_order(id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// GET /api/v1/orders/:id/invoice — renders the immutable snapshot.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice",
    responses(
        (status = 200, description = "Invoice document"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn order_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    ensure_can_view(&user, &order)?;
    let items = state.services.orders.line_items(id).await?;
    let document = state.services.invoices.render(&order, &items);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        document,
    )
        .into_response())
}
