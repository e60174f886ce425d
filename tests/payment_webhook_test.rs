//! Payment gateway webhook: signature enforcement, idempotent replay, and
//! the unpaid -> processing -> unpaid transitions it drives.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    checkout_completed_event, dec_field, payment_failed_event, response_json, two_vendor_cart,
    TestApp,
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;
use vendora_api::auth::UserRole;
use vendora_api::entities::webhook_event;

async fn checkout_order(app: &TestApp, customer_id: Uuid) -> Uuid {
    let token = app.token_for(customer_id, UserRole::Customer);
    let vendor_a = app.seed_vendor("Walnut Works", 0.into()).await;
    let vendor_b = app.seed_vendor("Linen & Co", 0.into()).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(two_vendor_cart(vendor_a.id, vendor_b.id)),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    body["data"]["order_id"]
        .as_str()
        .unwrap()
        .parse()
        .expect("order id")
}

async fn order_status(app: &TestApp, customer_id: Uuid, order_id: Uuid) -> serde_json::Value {
    let token = app.token_for(customer_id, UserRole::Customer);
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}

#[tokio::test]
async fn completed_checkout_moves_order_to_processing_with_snapshot() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let order_id = checkout_order(&app, customer_id).await;

    let response = app
        .post_payment_webhook(&checkout_completed_event("evt_001", order_id, customer_id))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = order_status(&app, customer_id, order_id).await;
    let order = &body["data"];
    assert_eq!(order["status"], "processing");
    // Gateway-reported snapshot replaced what checkout stored.
    assert!(order["shipping_address"]
        .as_str()
        .unwrap()
        .contains("Harbour Lane"));
    assert!(order["billing_address"]
        .as_str()
        .unwrap()
        .contains("buyer@example.com"));
    // The ordered total is untouched by payment processing.
    assert_eq!(dec_field(&order["total_amount"]), dec!(115));
}

#[tokio::test]
async fn replayed_event_is_a_no_op() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let order_id = checkout_order(&app, customer_id).await;

    let event = checkout_completed_event("evt_replay", order_id, customer_id);
    let first = app.post_payment_webhook(&event).await;
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.post_payment_webhook(&event).await;
    assert_eq!(second.status(), StatusCode::OK);

    let body = order_status(&app, customer_id, order_id).await;
    assert_eq!(body["data"]["status"], "processing");

    // Exactly one ledger row for the event id.
    let recorded = webhook_event::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(
        recorded
            .iter()
            .filter(|e| e.event_id == "evt_replay")
            .count(),
        1
    );
}

#[tokio::test]
async fn bad_signature_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let order_id = checkout_order(&app, customer_id).await;

    let response = app
        .post_payment_webhook_unsigned(&checkout_completed_event(
            "evt_forged",
            order_id,
            customer_id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = order_status(&app, customer_id, order_id).await;
    assert_eq!(body["data"]["status"], "unpaid");

    let recorded = webhook_event::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(recorded.is_empty());
}

#[tokio::test]
async fn unknown_order_is_acknowledged() {
    let app = TestApp::new().await;
    let response = app
        .post_payment_webhook(&checkout_completed_event(
            "evt_orphan",
            Uuid::new_v4(),
            Uuid::new_v4(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_payload_with_valid_signature_is_acknowledged() {
    let app = TestApp::new().await;
    let response = app
        .post_payment_webhook(&json!({"unexpected": "shape"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn payment_failure_reverts_processing_order_to_unpaid() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let order_id = checkout_order(&app, customer_id).await;

    let response = app
        .post_payment_webhook(&checkout_completed_event("evt_pay", order_id, customer_id))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_payment_webhook(&payment_failed_event("evt_fail", order_id))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = order_status(&app, customer_id, order_id).await;
    assert_eq!(body["data"]["status"], "unpaid");

    // No vendor was credited by any of this.
    let vendors = vendora_api::entities::vendor::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    for vendor in vendors {
        assert_eq!(vendor.total_earnings, dec!(0));
    }
}

#[tokio::test]
async fn payment_completion_after_failure_requires_unpaid_state() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let order_id = checkout_order(&app, customer_id).await;

    // Completion then a late failure then a replayed completion with a new
    // event id: the second completion applies because the order is unpaid
    // again.
    app.post_payment_webhook(&checkout_completed_event("evt_a", order_id, customer_id))
        .await;
    app.post_payment_webhook(&payment_failed_event("evt_b", order_id))
        .await;
    app.post_payment_webhook(&checkout_completed_event("evt_c", order_id, customer_id))
        .await;

    let body = order_status(&app, customer_id, order_id).await;
    assert_eq!(body["data"]["status"], "processing");
}
