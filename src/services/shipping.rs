use crate::{
    clients::{
        courier::{CourierApi, CreateShipmentRequest, ShipmentPiece},
        with_retry, RetryPolicy,
    },
    entities::{
        line_item::{self, LineItemStatus},
        OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::OrderLedger,
};
use chrono::Utc;
use futures::future::join_all;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VendorShipment {
    pub vendor_id: Uuid,
    pub reference_no: String,
    pub line_item_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DispatchOutcome {
    pub order_id: Uuid,
    pub shipments: Vec<VendorShipment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelOutcome {
    pub order_id: Uuid,
    pub cancelled_line_items: Vec<Uuid>,
    /// Items whose shipments had already reached a delivered-terminal state;
    /// excluded from cancellation and reported back to the caller.
    pub skipped_delivered: Vec<Uuid>,
}

/// Requests and cancels per-vendor shipments with the courier. Shipping is
/// all-or-nothing from the caller's perspective: partial courier success is
/// rolled back with compensating cancellations before the error surfaces.
#[derive(Clone)]
pub struct ShipmentOrchestrator {
    ledger: Arc<OrderLedger>,
    courier: Arc<dyn CourierApi>,
    event_sender: EventSender,
    retry: RetryPolicy,
}

impl ShipmentOrchestrator {
    pub fn new(
        ledger: Arc<OrderLedger>,
        courier: Arc<dyn CourierApi>,
        event_sender: EventSender,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            courier,
            event_sender,
            retry,
        }
    }

    /// Ships a processing order: one courier request per vendor group. Order
    /// and line-item state is written only after every group succeeded.
    #[instrument(skip(self))]
    pub async fn dispatch_order(&self, order_id: Uuid) -> Result<DispatchOutcome, ServiceError> {
        let order = self.ledger.get_order(order_id).await?;
        if order.status != OrderStatus::Processing {
            return Err(ServiceError::InvalidTransition(format!(
                "order {} is {}, only processing orders can ship",
                order.id, order.status
            )));
        }

        let items = self.ledger.line_items(order.id).await?;
        if items.is_empty() {
            return Err(ServiceError::InternalError(format!(
                "order {} has no line items",
                order.id
            )));
        }

        let mut groups: BTreeMap<Uuid, Vec<&line_item::Model>> = BTreeMap::new();
        for item in &items {
            groups.entry(item.vendor_id).or_default().push(item);
        }

        let mut created: Vec<VendorShipment> = Vec::with_capacity(groups.len());
        for (vendor_id, group) in &groups {
            let request = CreateShipmentRequest {
                order_id: order.id,
                purchase_number: order.purchase_number.clone(),
                vendor_id: *vendor_id,
                recipient_address: order.shipping_address.clone(),
                pieces: group
                    .iter()
                    .map(|i| ShipmentPiece {
                        line_item_id: i.id,
                        description: i.product_name.clone(),
                        quantity: i.quantity,
                    })
                    .collect(),
            };

            let ack = with_retry(self.retry, "courier.create_shipment", || {
                self.courier.create_shipment(request.clone())
            })
            .await;

            let reference = match ack {
                Ok(ack) if ack.success => ack.reference_no,
                Ok(ack) => {
                    warn!(
                        vendor_id = %vendor_id,
                        message = ack.message.as_deref().unwrap_or("none"),
                        "courier declined shipment group"
                    );
                    None
                }
                Err(e) => {
                    warn!(vendor_id = %vendor_id, error = %e, "courier shipment request failed");
                    None
                }
            };

            let Some(reference_no) = reference else {
                self.compensate(&created).await;
                return Err(ServiceError::ExternalServiceError(format!(
                    "shipment for vendor {} could not be created; {} completed group(s) rolled back",
                    vendor_id,
                    created.len()
                )));
            };

            created.push(VendorShipment {
                vendor_id: *vendor_id,
                reference_no,
                line_item_ids: group.iter().map(|i| i.id).collect(),
            });
        }

        // Every courier call succeeded; now commit the state change atomically.
        let txn = self
            .ledger
            .db()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;

        for shipment in &created {
            line_item::Entity::update_many()
                .col_expr(
                    line_item::Column::CourierReference,
                    Expr::value(shipment.reference_no.clone()),
                )
                .col_expr(
                    line_item::Column::Status,
                    Expr::value(LineItemStatus::Shipped),
                )
                .col_expr(line_item::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(line_item::Column::Id.is_in(shipment.line_item_ids.clone()))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
        }

        match self
            .ledger
            .transition_status(&txn, &order, OrderStatus::Shipped)
            .await
        {
            Ok(()) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
            }
            Err(err) => {
                // The order moved under us (payment failure, concurrent
                // cancel). Undo the courier bookings and surface the error.
                txn.rollback().await.map_err(ServiceError::db_error)?;
                self.compensate(&created).await;
                return Err(err);
            }
        }

        for shipment in &created {
            if let Err(e) = self
                .event_sender
                .send(Event::ShipmentDispatched {
                    order_id: order.id,
                    vendor_id: shipment.vendor_id,
                    reference_no: shipment.reference_no.clone(),
                })
                .await
            {
                warn!(order_id = %order.id, error = %e, "failed to emit shipment event");
            }
        }

        info!(order_id = %order.id, groups = created.len(), "order dispatched");
        Ok(DispatchOutcome {
            order_id: order.id,
            shipments: created,
        })
    }

    /// Cancels a processing or shipped order. Line items already delivered
    /// (or returned) are excluded and reported rather than failing the whole
    /// cancellation; any courier failure aborts before state is written.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<CancelOutcome, ServiceError> {
        let order = self.ledger.get_order(order_id).await?;
        if !matches!(order.status, OrderStatus::Processing | OrderStatus::Shipped) {
            return Err(ServiceError::InvalidTransition(format!(
                "order {} is {}, only processing or shipped orders can be cancelled",
                order.id, order.status
            )));
        }

        let items = self.ledger.line_items(order.id).await?;
        let (skipped, cancellable): (Vec<_>, Vec<_>) = items
            .iter()
            .partition(|i| i.status.is_delivered_terminal());

        // One courier shipment covers a whole vendor group; cancel each
        // reference once.
        let references: BTreeSet<&str> = cancellable
            .iter()
            .filter_map(|i| i.courier_reference.as_deref())
            .collect();

        for reference_no in references {
            with_retry(self.retry, "courier.cancel_shipment", || {
                self.courier.cancel_shipment(reference_no)
            })
            .await
            .map_err(|e| {
                warn!(order_id = %order.id, reference_no, error = %e, "courier cancellation failed");
                e
            })?;
        }

        let cancellable_ids: Vec<Uuid> = cancellable.iter().map(|i| i.id).collect();

        let txn = self
            .ledger
            .db()
            .begin()
            .await
            .map_err(ServiceError::db_error)?;

        if !cancellable_ids.is_empty() {
            line_item::Entity::update_many()
                .col_expr(
                    line_item::Column::Status,
                    Expr::value(LineItemStatus::Cancelled),
                )
                .col_expr(line_item::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(line_item::Column::Id.is_in(cancellable_ids.clone()))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
        }

        self.ledger
            .transition_status(&txn, &order, OrderStatus::Cancelled)
            .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: order.status,
                new_status: OrderStatus::Cancelled,
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "failed to emit cancellation event");
        }

        info!(
            order_id = %order.id,
            cancelled = cancellable_ids.len(),
            skipped = skipped.len(),
            "order cancelled"
        );
        Ok(CancelOutcome {
            order_id: order.id,
            cancelled_line_items: cancellable_ids,
            skipped_delivered: skipped.iter().map(|i| i.id).collect(),
        })
    }

    /// Compensating cancellations for vendor groups that were already booked
    /// when a later group failed. Best-effort: a compensation failure leaves
    /// an orphaned courier booking, which is logged loudly for manual review.
    async fn compensate(&self, created: &[VendorShipment]) {
        if created.is_empty() {
            return;
        }
        let cancellations = created.iter().map(|shipment| async move {
            let result = with_retry(self.retry, "courier.cancel_shipment", || {
                self.courier.cancel_shipment(&shipment.reference_no)
            })
            .await;
            (shipment, result)
        });

        for (shipment, result) in join_all(cancellations).await {
            match result {
                Ok(()) => info!(
                    vendor_id = %shipment.vendor_id,
                    reference_no = %shipment.reference_no,
                    "compensating cancellation succeeded"
                ),
                Err(e) => error!(
                    vendor_id = %shipment.vendor_id,
                    reference_no = %shipment.reference_no,
                    error = %e,
                    "compensating cancellation failed; courier booking orphaned"
                ),
            }
        }
    }
}
