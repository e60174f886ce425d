use crate::{
    auth::AuthenticatedUser,
    entities::{settlement_entry, vendor},
    errors::ServiceError,
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct EarningsResponse {
    pub vendor_id: Uuid,
    pub display_name: String,
    pub total_earnings: Decimal,
    pub available_withdrawal: Decimal,
    pub settled_line_items: u64,
    pub as_of: DateTime<Utc>,
}

/// GET /api/v1/vendors/:id/earnings — settlement-ledger-backed balance view,
/// visible to the vendor themselves and to admins.
#[utoipa::path(
    get,
    path = "/api/v1/vendors/{id}/earnings",
    responses(
        (status = 200, description = "Vendor balances", body = EarningsResponse),
        (status = 404, description = "Vendor not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Vendors"
)]
pub async fn vendor_earnings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    if !user.can_act_for_vendor(id) {
        return Err(ServiceError::Forbidden(
            "not allowed to view this vendor's earnings".to_string(),
        ));
    }

    let vendor = vendor::Entity::find_by_id(id)
        .one(&*state.db)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("vendor {id} not found")))?;

    let settled = settlement_entry::Entity::find()
        .filter(settlement_entry::Column::VendorId.eq(id))
        .count(&*state.db)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(Json(ApiResponse::ok(EarningsResponse {
        vendor_id: vendor.id,
        display_name: vendor.display_name,
        total_earnings: vendor.total_earnings,
        available_withdrawal: vendor.available_withdrawal,
        settled_line_items: settled,
        as_of: Utc::now(),
    })))
}
