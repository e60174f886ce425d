use crate::{
    db::DbPool,
    entities::{
        line_item::{self, LineItemStatus},
        settlement_entry, vendor,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Credited,
    AlreadySettled,
    NotEligible,
}

/// Credits vendor earnings exactly once per delivered line item.
///
/// The conditional `settled` flip is the primary defense against double
/// crediting from duplicate shipment events; the unique settlement-entry row
/// is the backstop.
#[derive(Clone)]
pub struct SettlementLedger {
    db: Arc<DbPool>,
    event_sender: EventSender,
    commission_rate: Decimal,
}

impl SettlementLedger {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, commission_rate: Decimal) -> Self {
        Self {
            db,
            event_sender,
            commission_rate,
        }
    }

    pub fn commission_rate(&self) -> Decimal {
        self.commission_rate
    }

    /// Computes the vendor's share of a line total under the configured
    /// commission rate, rounded to cents.
    pub fn net_payout(&self, line_total: Decimal) -> Decimal {
        (line_total * (Decimal::ONE - self.commission_rate)).round_dp(2)
    }

    #[instrument(skip(self, item), fields(line_item_id = %item.id, vendor_id = %item.vendor_id))]
    pub async fn settle_line_item(
        &self,
        item: &line_item::Model,
    ) -> Result<SettlementOutcome, ServiceError> {
        if item.status != LineItemStatus::Delivered {
            return Ok(SettlementOutcome::NotEligible);
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        // Flip the settled flag only if nobody has before us. Zero rows means
        // a concurrent or earlier delivery event already credited this item.
        let flipped = line_item::Entity::update_many()
            .col_expr(line_item::Column::Settled, Expr::value(true))
            .filter(line_item::Column::Id.eq(item.id))
            .filter(line_item::Column::Settled.eq(false))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if flipped.rows_affected == 0 {
            txn.commit().await.map_err(ServiceError::db_error)?;
            info!(line_item_id = %item.id, "line item already settled; no-op");
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let gross = item.line_total;
        let net = self.net_payout(gross);

        settlement_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            line_item_id: Set(item.id),
            order_id: Set(item.order_id),
            vendor_id: Set(item.vendor_id),
            gross_amount: Set(gross),
            commission_rate: Set(self.commission_rate),
            net_payout: Set(net),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        // Single-statement read-modify-write; a plain read-then-write here
        // would lose updates under concurrent settlement.
        let credited = vendor::Entity::update_many()
            .col_expr(
                vendor::Column::TotalEarnings,
                Expr::col(vendor::Column::TotalEarnings).add(net),
            )
            .col_expr(
                vendor::Column::AvailableWithdrawal,
                Expr::col(vendor::Column::AvailableWithdrawal).add(net),
            )
            .col_expr(vendor::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .filter(vendor::Column::Id.eq(item.vendor_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if credited.rows_affected == 0 {
            // Roll everything back rather than settle against a missing vendor.
            txn.rollback().await.map_err(ServiceError::db_error)?;
            warn!(vendor_id = %item.vendor_id, line_item_id = %item.id, "vendor missing; settlement aborted");
            return Err(ServiceError::NotFound(format!(
                "vendor {} not found for settlement",
                item.vendor_id
            )));
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            line_item_id = %item.id,
            vendor_id = %item.vendor_id,
            net_payout = %net,
            "line item settled"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::LineItemSettled {
                line_item_id: item.id,
                vendor_id: item.vendor_id,
                net_payout: net,
            })
            .await
        {
            warn!(line_item_id = %item.id, error = %e, "failed to emit settlement event");
        }

        Ok(SettlementOutcome::Credited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn ledger_with_rate(rate: Decimal) -> SettlementLedger {
        let (tx, _rx) = mpsc::channel(1);
        SettlementLedger::new(
            Arc::new(sea_orm::DatabaseConnection::Disconnected),
            EventSender::new(tx),
            rate,
        )
    }

    #[test]
    fn net_payout_withholds_commission() {
        let ledger = ledger_with_rate(dec!(0.10));
        assert_eq!(ledger.net_payout(dec!(100.00)), dec!(90.00));
        assert_eq!(ledger.net_payout(dec!(33.33)), dec!(30.00)); // 29.997 rounds up
    }

    #[test]
    fn zero_rate_pays_full_gross() {
        let ledger = ledger_with_rate(Decimal::ZERO);
        assert_eq!(ledger.net_payout(dec!(55.50)), dec!(55.50));
    }
}
