use crate::{
    clients::{
        gateway::{CreateSessionRequest, PaymentGateway, SessionLineItem},
        with_retry, RetryPolicy,
    },
    entities::{order, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::{NewLineItem, NewOrder, OrderLedger},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BeginCheckoutRequest {
    #[validate(length(min = 1, message = "cart must contain at least one line"))]
    pub lines: Vec<CheckoutLine>,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    #[validate(length(min = 3, max = 3, message = "currency must be 3 characters"))]
    pub currency: String,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CheckoutLine {
    pub vendor_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub purchase_number: String,
    pub session_id: String,
    pub payment_url: String,
}

/// Creates a pending order and requests a hosted payment session carrying the
/// order's correlation identifiers.
#[derive(Clone)]
pub struct CheckoutService {
    ledger: Arc<OrderLedger>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    retry: RetryPolicy,
}

impl CheckoutService {
    pub fn new(
        ledger: Arc<OrderLedger>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            gateway,
            event_sender,
            retry,
        }
    }

    /// Creates the order, then requests a session. Order creation failure is
    /// fatal; session failure after the order exists surfaces an error but
    /// leaves the order `unpaid` and recoverable through `resume_checkout`.
    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn begin_checkout(
        &self,
        customer_id: Uuid,
        request: BeginCheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.shipping_amount < Decimal::ZERO || request.tax_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "shipping and tax must not be negative".to_string(),
            ));
        }

        let (order, _items) = self
            .ledger
            .create_order(NewOrder {
                customer_id,
                currency: request.currency,
                shipping_amount: request.shipping_amount,
                tax_amount: request.tax_amount,
                shipping_address: request.shipping_address,
                billing_address: request.billing_address,
                lines: request
                    .lines
                    .into_iter()
                    .map(|l| NewLineItem {
                        vendor_id: l.vendor_id,
                        product_name: l.product_name,
                        sku: l.sku,
                        quantity: l.quantity,
                        unit_price: l.unit_price,
                    })
                    .collect(),
            })
            .await?;

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order.id)).await {
            warn!(order_id = %order.id, error = %e, "failed to emit order-created event");
        }

        self.issue_session(&order).await
    }

    /// Issues a fresh session for an existing unpaid order — the recovery
    /// path after a gateway outage at checkout time.
    #[instrument(skip(self))]
    pub async fn resume_checkout(&self, order_id: Uuid) -> Result<CheckoutResponse, ServiceError> {
        let order = self.ledger.get_order(order_id).await?;
        if order.status != OrderStatus::Unpaid {
            return Err(ServiceError::InvalidTransition(format!(
                "order {} is {}, not awaiting payment",
                order.id, order.status
            )));
        }
        self.issue_session(&order).await
    }

    async fn issue_session(&self, order: &order::Model) -> Result<CheckoutResponse, ServiceError> {
        let items = self.ledger.line_items(order.id).await?;
        let session_request = CreateSessionRequest {
            order_id: order.id,
            customer_id: order.customer_id,
            purchase_number: order.purchase_number.clone(),
            amount: order.total_amount,
            currency: order.currency.clone(),
            line_items: items
                .iter()
                .map(|i| SessionLineItem {
                    description: i.product_name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
        };

        let session = with_retry(self.retry, "gateway.create_session", || {
            self.gateway.create_session(session_request.clone())
        })
        .await?;

        self.ledger
            .set_payment_session(order, &session.session_id)
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::CheckoutSessionIssued {
                order_id: order.id,
                session_id: session.session_id.clone(),
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "failed to emit session event");
        }

        info!(order_id = %order.id, session_id = %session.session_id, "payment session issued");
        Ok(CheckoutResponse {
            order_id: order.id,
            purchase_number: order.purchase_number.clone(),
            session_id: session.session_id,
            payment_url: session.payment_url,
        })
    }
}
