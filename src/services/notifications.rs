use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// An in-app notification destined for a customer, vendor, or admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub author_id: Option<Uuid>,
    pub recipient: Uuid,
    pub transaction_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderStatus,
    Payment,
    Shipment,
    Withdrawal,
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Notification creation collaborator. Failures are logged by the event
/// worker and never affect the state transition that produced the event.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Transactional email collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

/// Default sink: records the notification in the log stream. Deployments
/// wire a real provider behind the same trait.
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            recipient = %notification.recipient,
            kind = ?notification.kind,
            title = %notification.title,
            "notification dispatched"
        );
        Ok(())
    }
}

pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(to = %message.to, subject = %message.subject, "email dispatched");
        Ok(())
    }
}
