use crate::{
    entities::{
        line_item::{self, LineItemStatus},
        order, OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        orders::OrderLedger,
        settlement::{SettlementLedger, SettlementOutcome},
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

const PROMOTION_ATTEMPTS: u32 = 3;

/// Courier webhook payload, keyed by shipment reference.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CourierEvent {
    pub reference_no: String,
    pub status: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub event_date_time: Option<String>,
    #[serde(default)]
    pub hub_name: Option<String>,
    #[serde(default)]
    pub rider_name: Option<String>,
    #[serde(default)]
    pub rider_code: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub pod_image: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShipmentEventSummary {
    pub matched_line_items: usize,
    pub order_promoted: bool,
    pub settled_line_items: usize,
}

/// Consumes asynchronous courier delivery events: updates line items and
/// their audit trail unconditionally, promotes terminal order status under
/// the once-terminal-always-terminal precedence rule, and hands delivered
/// items to the settlement ledger.
#[derive(Clone)]
pub struct ShipmentEventProcessor {
    ledger: Arc<OrderLedger>,
    settlement: Arc<SettlementLedger>,
    event_sender: EventSender,
}

impl ShipmentEventProcessor {
    pub fn new(
        ledger: Arc<OrderLedger>,
        settlement: Arc<SettlementLedger>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            ledger,
            settlement,
            event_sender,
        }
    }

    #[instrument(skip(self, event), fields(reference_no = %event.reference_no, status = %event.status))]
    pub async fn process(&self, event: CourierEvent) -> Result<ShipmentEventSummary, ServiceError> {
        let items = self
            .ledger
            .line_items_by_courier_reference(&event.reference_no)
            .await?;

        if items.is_empty() {
            info!(reference_no = %event.reference_no, "courier event for unknown reference; acknowledging");
            return Ok(ShipmentEventSummary {
                matched_line_items: 0,
                order_promoted: false,
                settled_line_items: 0,
            });
        }

        // A courier reference belongs to one vendor group of one order.
        // Spanning several orders means correlation data is corrupt.
        let order_id = items[0].order_id;
        if items.iter().any(|i| i.order_id != order_id) {
            return Err(ServiceError::InternalError(format!(
                "courier reference {} spans multiple orders",
                event.reference_no
            )));
        }

        let mapped_status = map_courier_status(&event.status);
        let event_at = parse_event_time(event.event_date_time.as_deref());

        let txn = self
            .ledger
            .db()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;

        let mut updated_items = Vec::with_capacity(items.len());
        for item in &items {
            let mut active: line_item::ActiveModel = item.clone().into();
            if let Some(status) = mapped_status {
                active.status = Set(status);
            }
            active.last_event_desc = Set(event.desc.clone());
            active.last_event_at = Set(Some(event_at));
            if event.hub_name.is_some() {
                active.hub_name = Set(event.hub_name.clone());
            }
            if event.rider_name.is_some() {
                active.rider_name = Set(event.rider_name.clone());
            }
            if event.rider_code.is_some() {
                active.rider_code = Set(event.rider_code.clone());
            }
            if event.failure_reason.is_some() {
                active.failure_reason = Set(event.failure_reason.clone());
            }
            if event.pod_image.is_some() {
                active.pod_image = Set(event.pod_image.clone());
            }
            active.updated_at = Set(Utc::now());

            let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
            updated_items.push(updated);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        let order_promoted = if let Some(target) = terminal_order_status(&event.status) {
            self.promote_order(order_id, target).await?
        } else {
            false
        };

        let mut settled = 0usize;
        if mapped_status == Some(LineItemStatus::Delivered) {
            for item in &updated_items {
                match self.settlement.settle_line_item(item).await {
                    Ok(SettlementOutcome::Credited) => settled += 1,
                    Ok(_) => {}
                    Err(e) => {
                        // Settlement failure must not reject the acknowledged
                        // event; the next delivery replay retries it.
                        warn!(line_item_id = %item.id, error = %e, "settlement failed");
                    }
                }
            }
        }

        if let Err(e) = self
            .event_sender
            .send(Event::ShipmentEventRecorded {
                reference_no: event.reference_no.clone(),
                status: event.status.clone(),
            })
            .await
        {
            warn!(reference_no = %event.reference_no, error = %e, "failed to emit shipment event");
        }

        Ok(ShipmentEventSummary {
            matched_line_items: updated_items.len(),
            order_promoted,
            settled_line_items: settled,
        })
    }

    /// Promotes the order to a terminal status unless it is already terminal:
    /// a late "delivered" after a cancellation stays on the audit trail only.
    async fn promote_order(
        &self,
        order_id: uuid::Uuid,
        target: OrderStatus,
    ) -> Result<bool, ServiceError> {
        for attempt in 1..=PROMOTION_ATTEMPTS {
            let Some(current) = order::Entity::find_by_id(order_id)
                .one(self.ledger.db())
                .await
                .map_err(ServiceError::db_error)?
            else {
                warn!(order_id = %order_id, "courier event for line items of a missing order");
                return Ok(false);
            };

            if current.status.is_terminal() {
                info!(
                    order_id = %order_id,
                    status = %current.status,
                    "order already terminal; courier event recorded on audit trail only"
                );
                return Ok(false);
            }

            match self
                .ledger
                .transition_status(self.ledger.db(), &current, target)
                .await
            {
                Ok(()) => {
                    if let Err(e) = self
                        .event_sender
                        .send(Event::OrderStatusChanged {
                            order_id,
                            old_status: current.status,
                            new_status: target,
                        })
                        .await
                    {
                        warn!(order_id = %order_id, error = %e, "failed to emit promotion event");
                    }
                    return Ok(true);
                }
                Err(ServiceError::ConcurrentModification(_)) if attempt < PROMOTION_ATTEMPTS => {
                    warn!(order_id = %order_id, attempt, "order version conflict during promotion; retrying");
                }
                Err(ServiceError::InvalidTransition(reason)) => {
                    // E.g. a delivered event while the order never shipped.
                    // The line-item audit trail keeps the event; the order
                    // state machine stays authoritative.
                    warn!(order_id = %order_id, %reason, "terminal promotion rejected");
                    return Ok(false);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }
}

fn map_courier_status(raw: &str) -> Option<LineItemStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "delivered" => Some(LineItemStatus::Delivered),
        "return-to-origin-delivered" => Some(LineItemStatus::Returned),
        "cancelled" => Some(LineItemStatus::Cancelled),
        "picked-up" | "in-transit" | "at-hub" | "out-for-delivery" => {
            Some(LineItemStatus::InTransit)
        }
        "delivery-failed" => Some(LineItemStatus::DeliveryFailed),
        _ => None,
    }
}

/// Terminal courier statuses and the order status they promote to.
fn terminal_order_status(raw: &str) -> Option<OrderStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "delivered" => Some(OrderStatus::Delivered),
        "return-to-origin-delivered" | "cancelled" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

fn parse_event_time(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
