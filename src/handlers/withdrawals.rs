use crate::{
    auth::{AuthenticatedUser, UserRole},
    entities::{withdrawal_request, WithdrawalStatus},
    errors::ServiceError,
    services::withdrawals::{MarkPaidInput, RequestWithdrawalInput},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalResponse {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub bank_reference: String,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub settlement_reference: Option<String>,
    pub invoice_image: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalListResponse {
    pub requests: Vec<WithdrawalResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub status: Option<WithdrawalStatus>,
    pub vendor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectInput {
    #[serde(default)]
    pub note: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

fn to_response(model: withdrawal_request::Model) -> WithdrawalResponse {
    WithdrawalResponse {
        id: model.id,
        vendor_id: model.vendor_id,
        bank_reference: model.bank_reference,
        amount: model.amount,
        status: model.status,
        settlement_reference: model.settlement_reference,
        invoice_image: model.invoice_image,
        note: model.note,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// POST /api/v1/withdrawals — vendor requests a payout from settled balance.
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals",
    request_body = RequestWithdrawalInput,
    responses(
        (status = 200, description = "Request created as pending", body = WithdrawalResponse),
        (status = 400, description = "Amount exceeds available balance", body = crate::errors::ErrorResponse)
    ),
    tag = "Withdrawals"
)]
pub async fn request_withdrawal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(input): Json<RequestWithdrawalInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let vendor_id = user.require_vendor()?;
    let request = state
        .services
        .withdrawals
        .request_withdrawal(vendor_id, input)
        .await?;
    Ok(Json(ApiResponse::ok(to_response(request))))
}

/// GET /api/v1/withdrawals — vendors see their own requests, admins all.
#[utoipa::path(
    get,
    path = "/api/v1/withdrawals",
    responses((status = 200, description = "Paginated withdrawal requests", body = WithdrawalListResponse)),
    tag = "Withdrawals"
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<WithdrawalListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let vendor_scope = match user.role {
        UserRole::Admin => query.vendor_id,
        UserRole::Vendor => Some(user.id),
        UserRole::Customer => {
            return Err(ServiceError::Forbidden(
                "withdrawals are vendor-only".to_string(),
            ))
        }
    };
    let (requests, total) = state
        .services
        .withdrawals
        .list(query.page, query.per_page, vendor_scope, query.status)
        .await?;
    Ok(Json(ApiResponse::ok(WithdrawalListResponse {
        requests: requests.into_iter().map(to_response).collect(),
        total,
        page: query.page,
        per_page: query.per_page,
    })))
}

/// POST /api/v1/withdrawals/:id/approve
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals/{id}/approve",
    responses(
        (status = 200, description = "Request approved", body = WithdrawalResponse),
        (status = 409, description = "Invalid state for approval", body = crate::errors::ErrorResponse)
    ),
    tag = "Withdrawals"
)]
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let request = state.services.withdrawals.approve(id).await?;
    Ok(Json(ApiResponse::ok(to_response(request))))
}

/// POST /api/v1/withdrawals/:id/reject
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals/{id}/reject",
    request_body = RejectInput,
    responses(
        (status = 200, description = "Request rejected", body = WithdrawalResponse),
        (status = 409, description = "Invalid state for rejection", body = crate::errors::ErrorResponse)
    ),
    tag = "Withdrawals"
)]
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<RejectInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let request = state.services.withdrawals.reject(id, input.note).await?;
    Ok(Json(ApiResponse::ok(to_response(request))))
}

/// POST /api/v1/withdrawals/:id/pay — requires a settlement reference; this
/// is where the vendor balance is debited.
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals/{id}/pay",
    request_body = MarkPaidInput,
    responses(
        (status = 200, description = "Payout recorded and balance debited", body = WithdrawalResponse),
        (status = 409, description = "Not approved, already paid, or balance insufficient", body = crate::errors::ErrorResponse)
    ),
    tag = "Withdrawals"
)]
pub async fn pay_withdrawal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<MarkPaidInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let request = state.services.withdrawals.mark_paid(id, input).await?;
    Ok(Json(ApiResponse::ok(to_response(request))))
}
