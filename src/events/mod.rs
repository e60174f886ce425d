use crate::entities::{OrderStatus, WithdrawalStatus};
use crate::services::notifications::{
    EmailMessage, Mailer, Notification, NotificationKind, NotificationSink,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after a state change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    CheckoutSessionIssued {
        order_id: Uuid,
        session_id: String,
    },
    PaymentCompleted {
        order_id: Uuid,
        customer_id: Uuid,
        purchase_number: String,
        customer_email: Option<String>,
    },
    PaymentFailed {
        order_id: Uuid,
        customer_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    ShipmentDispatched {
        order_id: Uuid,
        vendor_id: Uuid,
        reference_no: String,
    },
    ShipmentEventRecorded {
        reference_no: String,
        status: String,
    },
    LineItemSettled {
        line_item_id: Uuid,
        vendor_id: Uuid,
        net_payout: Decimal,
    },
    WithdrawalRequested {
        withdrawal_id: Uuid,
        vendor_id: Uuid,
        amount: Decimal,
    },
    WithdrawalStatusChanged {
        withdrawal_id: Uuid,
        vendor_id: Uuid,
        new_status: WithdrawalStatus,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event to the background worker. Send failure is reported to
    /// the caller but is never fatal to the transition that produced it.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }
}

/// Background worker draining the event channel. Every side effect here is
/// best-effort: a failing notification or email is logged and dropped, and
/// the acknowledged webhook or committed transition is unaffected.
pub async fn process_events(
    mut receiver: mpsc::Receiver<Event>,
    notifier: Arc<dyn NotificationSink>,
    mailer: Arc<dyn Mailer>,
) {
    while let Some(event) = receiver.recv().await {
        dispatch(&event, notifier.as_ref(), mailer.as_ref()).await;
    }
    info!("event channel closed; worker exiting");
}

async fn dispatch(event: &Event, notifier: &dyn NotificationSink, mailer: &dyn Mailer) {
    match event {
        Event::PaymentCompleted {
            order_id,
            customer_id,
            purchase_number,
            customer_email,
        } => {
            let result = notifier
                .notify(Notification {
                    author_id: None,
                    recipient: *customer_id,
                    transaction_id: Some(purchase_number.clone()),
                    title: "Payment received".to_string(),
                    description: format!("Your order {purchase_number} is now being processed."),
                    kind: NotificationKind::Payment,
                })
                .await;
            if let Err(e) = result {
                warn!(order_id = %order_id, error = %e, "payment notification failed");
            }
            if let Some(email) = customer_email {
                let result = mailer
                    .send(EmailMessage {
                        to: email.clone(),
                        subject: format!("Order {purchase_number} confirmed"),
                        body: format!(
                            "We received your payment for order {purchase_number}. \
                             We'll let you know when it ships."
                        ),
                    })
                    .await;
                if let Err(e) = result {
                    warn!(order_id = %order_id, error = %e, "confirmation email failed");
                }
            }
        }
        Event::PaymentFailed {
            order_id,
            customer_id,
        } => {
            let result = notifier
                .notify(Notification {
                    author_id: None,
                    recipient: *customer_id,
                    transaction_id: None,
                    title: "Payment failed".to_string(),
                    description: "Your payment did not go through; the order is awaiting payment."
                        .to_string(),
                    kind: NotificationKind::Payment,
                })
                .await;
            if let Err(e) = result {
                warn!(order_id = %order_id, error = %e, "payment-failed notification failed");
            }
        }
        Event::LineItemSettled {
            line_item_id,
            vendor_id,
            net_payout,
        } => {
            let result = notifier
                .notify(Notification {
                    author_id: None,
                    recipient: *vendor_id,
                    transaction_id: Some(line_item_id.to_string()),
                    title: "Earnings credited".to_string(),
                    description: format!("A delivered item settled for {net_payout}."),
                    kind: NotificationKind::Withdrawal,
                })
                .await;
            if let Err(e) = result {
                warn!(line_item_id = %line_item_id, error = %e, "settlement notification failed");
            }
        }
        Event::WithdrawalStatusChanged {
            withdrawal_id,
            vendor_id,
            new_status,
        } => {
            let result = notifier
                .notify(Notification {
                    author_id: None,
                    recipient: *vendor_id,
                    transaction_id: Some(withdrawal_id.to_string()),
                    title: "Withdrawal update".to_string(),
                    description: format!("Your withdrawal request is now {new_status}."),
                    kind: NotificationKind::Withdrawal,
                })
                .await;
            if let Err(e) = result {
                warn!(withdrawal_id = %withdrawal_id, error = %e, "withdrawal notification failed");
            }
        }
        // Remaining events are observability-only for now.
        other => {
            info!(event = ?other, "event recorded");
        }
    }
}
