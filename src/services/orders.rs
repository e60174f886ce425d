use crate::{
    db::DbPool,
    entities::{
        line_item::{self, LineItemStatus},
        order::{self, OrderStatus},
    },
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Input for creating an order; totals are computed here, never trusted from
/// the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub currency: String,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub lines: Vec<NewLineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub vendor_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// The authoritative store and transition-enforcer for order state. Every
/// status write goes through a version-checked update, so concurrent payment
/// and shipment events on the same order serialize instead of clobbering
/// each other.
#[derive(Clone)]
pub struct OrderLedger {
    db: Arc<DbPool>,
}

impl OrderLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    /// Creates an order in `unpaid` status together with its line items,
    /// atomically.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create_order(
        &self,
        input: NewOrder,
    ) -> Result<(order::Model, Vec<line_item::Model>), ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one line item".to_string(),
            ));
        }
        for line in &input.lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for {} must be positive",
                    line.sku
                )));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "unit price for {} must not be negative",
                    line.sku
                )));
            }
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let purchase_number = generate_purchase_number(order_id);

        let subtotal: Decimal = input
            .lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        let total = subtotal + input.shipping_amount + input.tax_amount;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            purchase_number: Set(purchase_number),
            customer_id: Set(input.customer_id),
            status: Set(OrderStatus::Unpaid),
            subtotal: Set(subtotal),
            shipping_amount: Set(input.shipping_amount),
            tax_amount: Set(input.tax_amount),
            total_amount: Set(total),
            currency: Set(input.currency),
            payment_session_id: Set(None),
            shipping_address: Set(input.shipping_address),
            billing_address: Set(input.billing_address),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let mut items = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            let item = line_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                vendor_id: Set(line.vendor_id),
                product_name: Set(line.product_name),
                sku: Set(line.sku),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line.unit_price * Decimal::from(line.quantity)),
                status: Set(LineItemStatus::Pending),
                courier_reference: Set(None),
                last_event_desc: Set(None),
                last_event_at: Set(None),
                hub_name: Set(None),
                rider_name: Set(None),
                rider_code: Set(None),
                failure_reason: Set(None),
                pod_image: Set(None),
                settled: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "failed to insert line item");
                ServiceError::DatabaseError(e)
            })?;
            items.push(item);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(order_id = %order_id, total = %order_model.total_amount, "order created");
        Ok((order_model, items))
    }

    pub async fn find_order(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))
    }

    pub async fn line_items(&self, order_id: Uuid) -> Result<Vec<line_item::Model>, ServiceError> {
        line_item::Entity::find()
            .filter(line_item::Column::OrderId.eq(order_id))
            .order_by_asc(line_item::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Line items correlated to a courier reference, across whatever order
    /// the shipment belongs to.
    pub async fn line_items_by_courier_reference(
        &self,
        reference_no: &str,
    ) -> Result<Vec<line_item::Model>, ServiceError> {
        line_item::Entity::find()
            .filter(line_item::Column::CourierReference.eq(reference_no))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Paginated order listing, newest first, optionally filtered by status
    /// or customer.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
        status: Option<OrderStatus>,
        customer_id: Option<Uuid>,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = order::Entity::find();
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(customer_id) = customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((orders, total))
    }

    /// Version-checked status transition. Zero rows affected means another
    /// writer got there first; the caller decides whether to reload and
    /// retry or give up.
    pub async fn transition_status<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: &order::Model,
        new_status: OrderStatus,
    ) -> Result<(), ServiceError> {
        self.transition_with(conn, current, new_status, None, None)
            .await
    }

    /// Transition plus the gateway-reported address snapshot, written in the
    /// same statement so a replayed event can never half-apply.
    pub async fn transition_with<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: &order::Model,
        new_status: OrderStatus,
        shipping_address: Option<String>,
        billing_address: Option<String>,
    ) -> Result<(), ServiceError> {
        if !current.status.can_transition_to(new_status) {
            warn!(
                order_id = %current.id,
                from = %current.status,
                to = %new_status,
                "rejected status transition"
            );
            return Err(ServiceError::InvalidTransition(format!(
                "cannot transition order {} from {} to {}",
                current.id, current.status, new_status
            )));
        }

        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            );
        if let Some(shipping) = shipping_address {
            update = update.col_expr(order::Column::ShippingAddress, Expr::value(shipping));
        }
        if let Some(billing) = billing_address {
            update = update.col_expr(order::Column::BillingAddress, Expr::value(billing));
        }

        let result = update
            .filter(order::Column::Id.eq(current.id))
            .filter(order::Column::Version.eq(current.version))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(current.id));
        }

        info!(
            order_id = %current.id,
            from = %current.status,
            to = %new_status,
            "order status transitioned"
        );
        Ok(())
    }

    /// Stores the gateway session id on an order (checkout initiation and
    /// resume). Version-checked like every other order write.
    pub async fn set_payment_session(
        &self,
        current: &order::Model,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentSessionId,
                Expr::value(session_id.to_string()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(current.id))
            .filter(order::Column::Version.eq(current.version))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(current.id));
        }
        Ok(())
    }
}

fn generate_purchase_number(order_id: Uuid) -> String {
    format!(
        "ORD-{}",
        order_id.simple().to_string()[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_number_is_prefixed_and_short() {
        let n = generate_purchase_number(Uuid::new_v4());
        assert!(n.starts_with("ORD-"));
        assert_eq!(n.len(), 12);
        assert_eq!(n, n.to_uppercase());
    }
}
