use crate::{
    db::DbPool,
    entities::{webhook_event, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::OrderLedger,
};
use axum::http::HeaderMap;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TOLERANCE_SECS: u64 = 300;
const TRANSITION_ATTEMPTS: u32 = 3;

/// What became of an authenticated webhook delivery. Everything here is
/// acknowledged with 200; only a signature failure is rejected.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookDisposition {
    Applied,
    Duplicate,
    Ignored(&'static str),
}

/// Consumes asynchronous payment-gateway events and drives order-status
/// transitions. Events arrive at-least-once and out of order; every path
/// through here is idempotent.
#[derive(Clone)]
pub struct PaymentEventProcessor {
    ledger: Arc<OrderLedger>,
    db: Arc<DbPool>,
    redis: Arc<redis::Client>,
    event_sender: EventSender,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
}

impl PaymentEventProcessor {
    pub fn new(
        ledger: Arc<OrderLedger>,
        db: Arc<DbPool>,
        redis: Arc<redis::Client>,
        event_sender: EventSender,
        webhook_secret: Option<String>,
        tolerance_secs: Option<u64>,
    ) -> Self {
        Self {
            ledger,
            db,
            redis,
            event_sender,
            webhook_secret,
            tolerance_secs: tolerance_secs.unwrap_or(DEFAULT_TOLERANCE_SECS),
        }
    }

    #[instrument(skip(self, headers, payload))]
    pub async fn process(
        &self,
        headers: &HeaderMap,
        payload: &Bytes,
    ) -> Result<WebhookDisposition, ServiceError> {
        if let Some(secret) = &self.webhook_secret {
            if !verify_signature(headers, payload, secret, self.tolerance_secs) {
                warn!("payment webhook signature verification failed");
                return Err(ServiceError::AuthError(
                    "invalid webhook signature".to_string(),
                ));
            }
        }

        // Past this point nothing is rejected: a malformed or unknown event
        // is acknowledged so the sender does not retry forever.
        let json: Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "payment webhook payload is not valid json; acknowledging");
                return Ok(WebhookDisposition::Ignored("malformed payload"));
            }
        };

        let event_id = json.get("id").and_then(|v| v.as_str()).map(str::to_owned);

        if let Some(id) = &event_id {
            if self.seen_in_redis(id).await {
                info!(event_id = %id, "webhook event already processed (fast path)");
                return Ok(WebhookDisposition::Duplicate);
            }
        }

        let event_type = json.get("type").and_then(|v| v.as_str()).unwrap_or("");
        match event_type {
            "checkout.session.completed" => {
                self.handle_checkout_completed(event_id.as_deref(), &json)
                    .await
            }
            "payment_intent.payment_failed" => {
                self.handle_payment_failed(event_id.as_deref(), &json).await
            }
            other => {
                info!(event_type = %other, "unhandled payment webhook type");
                Ok(WebhookDisposition::Ignored("unhandled event type"))
            }
        }
    }

    /// `checkout.session.completed`: the customer paid. If the order is still
    /// `unpaid`, move it to `processing` and persist the gateway-reported
    /// address snapshot in the same statement.
    async fn handle_checkout_completed(
        &self,
        event_id: Option<&str>,
        json: &Value,
    ) -> Result<WebhookDisposition, ServiceError> {
        let object = json.pointer("/data/object");
        let Some(order_id) = correlation_order_id(object) else {
            warn!("checkout-completed event carries no order correlation; acknowledging");
            return Ok(WebhookDisposition::Ignored("missing correlation"));
        };

        let shipping_snapshot = object
            .and_then(|o| o.get("shipping_details"))
            .filter(|v| !v.is_null())
            .map(|v| v.to_string());
        let billing_snapshot = object
            .and_then(|o| o.get("customer_details"))
            .filter(|v| !v.is_null())
            .map(|v| v.to_string());
        let customer_email = object
            .and_then(|o| o.pointer("/customer_details/email"))
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        for attempt in 1..=TRANSITION_ATTEMPTS {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            if let Some(id) = event_id {
                if !record_event(&txn, id, "payment").await? {
                    txn.commit().await.map_err(ServiceError::db_error)?;
                    info!(event_id = %id, "webhook event already recorded; no-op");
                    return Ok(WebhookDisposition::Duplicate);
                }
            }

            let Some(order) = crate::entities::order::Entity::find_by_id(order_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
            else {
                txn.commit().await.map_err(ServiceError::db_error)?;
                warn!(order_id = %order_id, "payment event for unknown order; acknowledging");
                return Ok(WebhookDisposition::Ignored("unknown order"));
            };

            if order.status != OrderStatus::Unpaid {
                txn.commit().await.map_err(ServiceError::db_error)?;
                info!(
                    order_id = %order.id,
                    status = %order.status,
                    "order not awaiting payment; event recorded without transition"
                );
                return Ok(WebhookDisposition::Ignored("order not awaiting payment"));
            }

            match self
                .ledger
                .transition_with(
                    &txn,
                    &order,
                    OrderStatus::Processing,
                    shipping_snapshot.clone(),
                    billing_snapshot.clone(),
                )
                .await
            {
                Ok(()) => {
                    txn.commit().await.map_err(ServiceError::db_error)?;
                    // Notification and email ride the background worker; their
                    // failure never rolls back the committed transition.
                    if let Err(e) = self
                        .event_sender
                        .send(Event::PaymentCompleted {
                            order_id: order.id,
                            customer_id: order.customer_id,
                            purchase_number: order.purchase_number.clone(),
                            customer_email: customer_email.clone(),
                        })
                        .await
                    {
                        warn!(order_id = %order.id, error = %e, "failed to emit payment-completed event");
                    }
                    return Ok(WebhookDisposition::Applied);
                }
                Err(ServiceError::ConcurrentModification(_)) if attempt < TRANSITION_ATTEMPTS => {
                    txn.rollback().await.map_err(ServiceError::db_error)?;
                    warn!(order_id = %order.id, attempt, "order version conflict; retrying");
                }
                Err(err) => {
                    txn.rollback().await.map_err(ServiceError::db_error)?;
                    return Err(err);
                }
            }
        }

        Err(ServiceError::ConcurrentModification(order_id))
    }

    /// `payment_intent.payment_failed`: send any non-terminal order back to
    /// `unpaid` so a new session can be issued.
    async fn handle_payment_failed(
        &self,
        event_id: Option<&str>,
        json: &Value,
    ) -> Result<WebhookDisposition, ServiceError> {
        let object = json.pointer("/data/object");
        let Some(order_id) = correlation_order_id(object) else {
            warn!("payment-failed event carries no order correlation; acknowledging");
            return Ok(WebhookDisposition::Ignored("missing correlation"));
        };

        for attempt in 1..=TRANSITION_ATTEMPTS {
            let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

            if let Some(id) = event_id {
                if !record_event(&txn, id, "payment").await? {
                    txn.commit().await.map_err(ServiceError::db_error)?;
                    return Ok(WebhookDisposition::Duplicate);
                }
            }

            let Some(order) = crate::entities::order::Entity::find_by_id(order_id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
            else {
                txn.commit().await.map_err(ServiceError::db_error)?;
                warn!(order_id = %order_id, "payment-failed event for unknown order; acknowledging");
                return Ok(WebhookDisposition::Ignored("unknown order"));
            };

            if order.status.is_terminal() || order.status == OrderStatus::Unpaid {
                txn.commit().await.map_err(ServiceError::db_error)?;
                info!(order_id = %order.id, status = %order.status, "payment failure ignored");
                return Ok(WebhookDisposition::Ignored("order already settled state"));
            }

            match self
                .ledger
                .transition_status(&txn, &order, OrderStatus::Unpaid)
                .await
            {
                Ok(()) => {
                    txn.commit().await.map_err(ServiceError::db_error)?;
                    if let Err(e) = self
                        .event_sender
                        .send(Event::PaymentFailed {
                            order_id: order.id,
                            customer_id: order.customer_id,
                        })
                        .await
                    {
                        warn!(order_id = %order.id, error = %e, "failed to emit payment-failed event");
                    }
                    return Ok(WebhookDisposition::Applied);
                }
                Err(ServiceError::ConcurrentModification(_)) if attempt < TRANSITION_ATTEMPTS => {
                    txn.rollback().await.map_err(ServiceError::db_error)?;
                    warn!(order_id = %order.id, attempt, "order version conflict; retrying");
                }
                Err(err) => {
                    txn.rollback().await.map_err(ServiceError::db_error)?;
                    return Err(err);
                }
            }
        }

        Err(ServiceError::ConcurrentModification(order_id))
    }

    /// Best-effort Redis fast path; the durable `webhook_events` row is the
    /// source of truth when Redis is unreachable.
    async fn seen_in_redis(&self, event_id: &str) -> bool {
        let key = format!("wh:{event_id}");
        if let Ok(mut conn) = self.redis.get_async_connection().await {
            let set: Result<bool, _> = redis::cmd("SET")
                .arg(&key)
                .arg("1")
                .arg("NX")
                .arg("EX")
                .arg(24 * 3600)
                .query_async(&mut conn)
                .await;
            if let Ok(false) = set {
                return true;
            }
        }
        false
    }
}

/// Records an event id in the dedupe ledger. Returns false when the id was
/// already present (replayed delivery).
async fn record_event<C: sea_orm::ConnectionTrait>(
    conn: &C,
    event_id: &str,
    source: &str,
) -> Result<bool, ServiceError> {
    let existing = webhook_event::Entity::find()
        .filter(webhook_event::Column::EventId.eq(event_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if existing.is_some() {
        return Ok(false);
    }

    let insert = webhook_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        event_id: Set(event_id.to_string()),
        source: Set(source.to_string()),
        ..Default::default()
    }
    .insert(conn)
    .await;

    match insert {
        Ok(_) => Ok(true),
        Err(err) if is_unique_violation(&err) => Ok(false),
        Err(err) => Err(ServiceError::DatabaseError(err)),
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn correlation_order_id(object: Option<&Value>) -> Option<Uuid> {
    object
        .and_then(|o| o.pointer("/metadata/order_id"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    // Generic HMAC: x-timestamp and x-signature headers.
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            return signature_matches(ts, payload, secret, sig);
        }
    }
    // Stripe-style: Stripe-Signature with t=, v1=.
    if let Some(sig) = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in sig.split(',') {
            let mut it = part.split('=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return signature_matches(ts, payload, secret, v1);
        }
    }
    false
}

fn signature_matches(ts: &str, payload: &Bytes, secret: &str, provided: &str) -> bool {
    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, provided)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Computes the `x-signature` value for a body signed at `ts`. Shared with
/// the test harness so requests can be signed the way the gateway signs them.
pub fn sign_payload(secret: &str, ts: &str, payload: &[u8]) -> String {
    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(signed.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signed_headers(secret: &str, body: &Bytes) -> HeaderMap {
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = sign_payload(secret, &ts, body);
        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_str(&ts).unwrap());
        headers.insert("x-signature", HeaderValue::from_str(&sig).unwrap());
        headers
    }

    #[test]
    fn valid_signature_verifies() {
        let body = Bytes::from_static(b"{\"id\":\"evt_1\"}");
        let headers = signed_headers("whsec_test", &body);
        assert!(verify_signature(&headers, &body, "whsec_test", 300));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = Bytes::from_static(b"{\"id\":\"evt_1\"}");
        let headers = signed_headers("whsec_test", &body);
        assert!(!verify_signature(&headers, &body, "whsec_other", 300));
    }

    #[test]
    fn tampered_body_fails() {
        let body = Bytes::from_static(b"{\"id\":\"evt_1\"}");
        let headers = signed_headers("whsec_test", &body);
        let tampered = Bytes::from_static(b"{\"id\":\"evt_2\"}");
        assert!(!verify_signature(&headers, &tampered, "whsec_test", 300));
    }

    #[test]
    fn stale_timestamp_fails() {
        let body = Bytes::from_static(b"{}");
        let ts = (chrono::Utc::now().timestamp() - 3600).to_string();
        let sig = sign_payload("whsec_test", &ts, &body);
        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_str(&ts).unwrap());
        headers.insert("x-signature", HeaderValue::from_str(&sig).unwrap());
        assert!(!verify_signature(&headers, &body, "whsec_test", 300));
    }

    #[test]
    fn stripe_style_header_verifies() {
        let body = Bytes::from_static(b"{\"id\":\"evt_9\"}");
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = sign_payload("whsec_test", &ts, &body);
        let mut headers = HeaderMap::new();
        headers.insert(
            "Stripe-Signature",
            HeaderValue::from_str(&format!("t={ts},v1={sig}")).unwrap(),
        );
        assert!(verify_signature(&headers, &body, "whsec_test", 300));
    }

    #[test]
    fn correlation_requires_a_uuid() {
        let json: Value = serde_json::json!({
            "data": {"object": {"metadata": {"order_id": "not-a-uuid"}}}
        });
        assert!(correlation_order_id(json.pointer("/data/object")).is_none());

        let id = Uuid::new_v4();
        let json: Value = serde_json::json!({
            "data": {"object": {"metadata": {"order_id": id.to_string()}}}
        });
        assert_eq!(correlation_order_id(json.pointer("/data/object")), Some(id));
    }
}
