pub mod checkout;
pub mod orders;
pub mod payment_webhooks;
pub mod shipment_webhooks;
pub mod vendors;
pub mod withdrawals;

use crate::{
    clients::{courier::CourierApi, gateway::PaymentGateway, RetryPolicy},
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        checkout::CheckoutService, invoices::InvoiceRenderer, orders::OrderLedger,
        payment_events::PaymentEventProcessor, settlement::SettlementLedger,
        shipment_events::ShipmentEventProcessor, shipping::ShipmentOrchestrator,
        withdrawals::WithdrawalService,
    },
};
use std::sync::Arc;
use std::time::Duration;

pub use crate::AppState;

/// Business services used by the HTTP handlers. The gateway and courier
/// clients come in as trait objects so tests can script them.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderLedger>,
    pub checkout: Arc<CheckoutService>,
    pub payment_events: Arc<PaymentEventProcessor>,
    pub shipping: Arc<ShipmentOrchestrator>,
    pub shipment_events: Arc<ShipmentEventProcessor>,
    pub settlement: Arc<SettlementLedger>,
    pub withdrawals: Arc<WithdrawalService>,
    pub invoices: InvoiceRenderer,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        redis: Arc<redis::Client>,
        gateway: Arc<dyn PaymentGateway>,
        courier: Arc<dyn CourierApi>,
        config: &AppConfig,
    ) -> Self {
        let retry = RetryPolicy::new(
            config.external_retry_attempts,
            Duration::from_millis(config.external_retry_base_ms),
        );

        let orders = Arc::new(OrderLedger::new(db.clone()));
        let settlement = Arc::new(SettlementLedger::new(
            db.clone(),
            event_sender.clone(),
            config.commission_rate_decimal(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            orders.clone(),
            gateway,
            event_sender.clone(),
            retry,
        ));
        let payment_events = Arc::new(PaymentEventProcessor::new(
            orders.clone(),
            db.clone(),
            redis,
            event_sender.clone(),
            config.payment_webhook_secret.clone(),
            config.payment_webhook_tolerance_secs,
        ));
        let shipping = Arc::new(ShipmentOrchestrator::new(
            orders.clone(),
            courier,
            event_sender.clone(),
            retry,
        ));
        let shipment_events = Arc::new(ShipmentEventProcessor::new(
            orders.clone(),
            settlement.clone(),
            event_sender.clone(),
        ));
        let withdrawals = Arc::new(WithdrawalService::new(db, event_sender));

        Self {
            orders,
            checkout,
            payment_events,
            shipping,
            shipment_events,
            settlement,
            withdrawals,
            invoices: InvoiceRenderer::new(),
        }
    }
}
