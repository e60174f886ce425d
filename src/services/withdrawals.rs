use crate::{
    db::DbPool,
    entities::{
        vendor,
        withdrawal_request::{self, WithdrawalStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestWithdrawalInput {
    pub amount: Decimal,
    pub bank_reference: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkPaidInput {
    pub settlement_reference: String,
    #[serde(default)]
    pub invoice_image: Option<String>,
}

/// Vendor-initiated payout requests, gated by settled available balance.
/// The balance is validated at request and approval time but only debited —
/// atomically and guarded — when the request is marked paid.
#[derive(Clone)]
pub struct WithdrawalService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl WithdrawalService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(vendor_id = %vendor_id, amount = %input.amount))]
    pub async fn request_withdrawal(
        &self,
        vendor_id: Uuid,
        input: RequestWithdrawalInput,
    ) -> Result<withdrawal_request::Model, ServiceError> {
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        if input.bank_reference.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "bank reference is required".to_string(),
            ));
        }

        let vendor = vendor::Entity::find_by_id(vendor_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("vendor {vendor_id} not found")))?;

        if input.amount > vendor.available_withdrawal {
            return Err(ServiceError::ValidationError(format!(
                "requested {} exceeds available balance {}",
                input.amount, vendor.available_withdrawal
            )));
        }

        let model = withdrawal_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            bank_reference: Set(input.bank_reference),
            amount: Set(input.amount),
            status: Set(WithdrawalStatus::Pending),
            settlement_reference: Set(None),
            invoice_image: Set(None),
            note: Set(input.note),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(withdrawal_id = %model.id, "withdrawal requested");
        if let Err(e) = self
            .event_sender
            .send(Event::WithdrawalRequested {
                withdrawal_id: model.id,
                vendor_id,
                amount: model.amount,
            })
            .await
        {
            warn!(withdrawal_id = %model.id, error = %e, "failed to emit withdrawal event");
        }
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        withdrawal_id: Uuid,
    ) -> Result<withdrawal_request::Model, ServiceError> {
        let request = self.get(withdrawal_id).await?;
        if request.status == WithdrawalStatus::Approved {
            return Ok(request);
        }
        self.ensure_transition(&request, WithdrawalStatus::Approved)?;

        // The balance is only reserved at payment time, so re-check it here:
        // settlements and other payouts may have moved it since the request.
        let vendor = vendor::Entity::find_by_id(request.vendor_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("vendor {} not found", request.vendor_id))
            })?;
        if request.amount > vendor.available_withdrawal {
            return Err(ServiceError::ValidationError(format!(
                "amount {} no longer covered by available balance {}",
                request.amount, vendor.available_withdrawal
            )));
        }

        self.set_status(request, WithdrawalStatus::Approved, None)
            .await
    }

    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        withdrawal_id: Uuid,
        note: Option<String>,
    ) -> Result<withdrawal_request::Model, ServiceError> {
        let request = self.get(withdrawal_id).await?;
        if request.status == WithdrawalStatus::Rejected {
            return Ok(request);
        }
        self.ensure_transition(&request, WithdrawalStatus::Rejected)?;
        self.set_status(request, WithdrawalStatus::Rejected, note)
            .await
    }

    /// Marks an approved request paid: records the settlement reference and
    /// debits the vendor's available balance in one guarded transaction.
    #[instrument(skip(self, input))]
    pub async fn mark_paid(
        &self,
        withdrawal_id: Uuid,
        input: MarkPaidInput,
    ) -> Result<withdrawal_request::Model, ServiceError> {
        if input.settlement_reference.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "settlement reference is required to mark a withdrawal paid".to_string(),
            ));
        }

        let request = self.get(withdrawal_id).await?;
        self.ensure_transition(&request, WithdrawalStatus::Paid)?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        // Conditional flip so two admins cannot both pay the same request.
        let flipped = withdrawal_request::Entity::update_many()
            .col_expr(
                withdrawal_request::Column::Status,
                Expr::value(WithdrawalStatus::Paid),
            )
            .col_expr(
                withdrawal_request::Column::SettlementReference,
                Expr::value(input.settlement_reference.clone()),
            )
            .col_expr(
                withdrawal_request::Column::InvoiceImage,
                Expr::value(input.invoice_image.clone()),
            )
            .col_expr(
                withdrawal_request::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(withdrawal_request::Column::Id.eq(request.id))
            .filter(withdrawal_request::Column::Status.eq(WithdrawalStatus::Approved))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if flipped.rows_affected == 0 {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            return Err(ServiceError::ConcurrentModification(request.id));
        }

        // Guarded atomic debit; this is the single point where money leaves
        // the vendor's balance.
        let debited = vendor::Entity::update_many()
            .col_expr(
                vendor::Column::AvailableWithdrawal,
                Expr::col(vendor::Column::AvailableWithdrawal).sub(request.amount),
            )
            .col_expr(vendor::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(vendor::Column::Id.eq(request.vendor_id))
            .filter(vendor::Column::AvailableWithdrawal.gte(request.amount))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if debited.rows_affected == 0 {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            warn!(
                withdrawal_id = %request.id,
                vendor_id = %request.vendor_id,
                "available balance no longer covers the payout"
            );
            return Err(ServiceError::InvalidTransition(format!(
                "available balance no longer covers withdrawal {}",
                request.id
            )));
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        let paid = self.get(withdrawal_id).await?;
        info!(withdrawal_id = %paid.id, amount = %paid.amount, "withdrawal paid");
        if let Err(e) = self
            .event_sender
            .send(Event::WithdrawalStatusChanged {
                withdrawal_id: paid.id,
                vendor_id: paid.vendor_id,
                new_status: WithdrawalStatus::Paid,
            })
            .await
        {
            warn!(withdrawal_id = %paid.id, error = %e, "failed to emit withdrawal event");
        }
        Ok(paid)
    }

    pub async fn get(
        &self,
        withdrawal_id: Uuid,
    ) -> Result<withdrawal_request::Model, ServiceError> {
        withdrawal_request::Entity::find_by_id(withdrawal_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("withdrawal request {withdrawal_id} not found"))
            })
    }

    /// Paginated listing, newest first; scoped to one vendor unless the
    /// caller is an admin.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        vendor_id: Option<Uuid>,
        status: Option<WithdrawalStatus>,
    ) -> Result<(Vec<withdrawal_request::Model>, u64), ServiceError> {
        let mut query = withdrawal_request::Entity::find();
        if let Some(vendor_id) = vendor_id {
            query = query.filter(withdrawal_request::Column::VendorId.eq(vendor_id));
        }
        if let Some(status) = status {
            query = query.filter(withdrawal_request::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(withdrawal_request::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let requests = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((requests, total))
    }

    fn ensure_transition(
        &self,
        request: &withdrawal_request::Model,
        next: WithdrawalStatus,
    ) -> Result<(), ServiceError> {
        if !request.status.can_transition_to(next) {
            return Err(ServiceError::InvalidTransition(format!(
                "withdrawal {} cannot move from {} to {}",
                request.id, request.status, next
            )));
        }
        Ok(())
    }

    async fn set_status(
        &self,
        request: withdrawal_request::Model,
        status: WithdrawalStatus,
        note: Option<String>,
    ) -> Result<withdrawal_request::Model, ServiceError> {
        let id = request.id;
        let vendor_id = request.vendor_id;
        let mut active: withdrawal_request::ActiveModel = request.into();
        active.status = Set(status);
        if note.is_some() {
            active.note = Set(note);
        }
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(withdrawal_id = %id, status = %status, "withdrawal status changed");
        if let Err(e) = self
            .event_sender
            .send(Event::WithdrawalStatusChanged {
                withdrawal_id: id,
                vendor_id,
                new_status: status,
            })
            .await
        {
            warn!(withdrawal_id = %id, error = %e, "failed to emit withdrawal event");
        }
        Ok(updated)
    }
}
