//! Withdrawal pipeline: balance-gated creation, the approve/reject/pay state
//! machine, and the guarded debit at payment time.

mod common;

use axum::http::{Method, StatusCode};
use common::{dec_field, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;
use vendora_api::auth::UserRole;

async fn create_request(
    app: &TestApp,
    vendor_id: Uuid,
    amount: &str,
) -> (StatusCode, serde_json::Value) {
    let token = app.token_for(vendor_id, UserRole::Vendor);
    let response = app
        .request(
            Method::POST,
            "/api/v1/withdrawals",
            Some(json!({
                "amount": amount,
                "bank_reference": "bank-acct-007",
                "note": "monthly payout"
            })),
            Some(&token),
        )
        .await;
    let status = response.status();
    (status, response_json(response).await)
}

#[tokio::test]
async fn requests_above_available_balance_are_rejected_at_creation() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Walnut Works", dec!(100)).await;

    let (status, _body) = create_request(&app, vendor.id, "150.00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = create_request(&app, vendor.id, "100.00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Walnut Works", dec!(100)).await;

    let (status, _) = create_request(&app, vendor.id, "0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = create_request(&app, vendor.id, "-5.00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_debits_the_balance_exactly_at_pay_time() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Walnut Works", dec!(100)).await;
    let admin = app.admin_token();

    let (_, body) = create_request(&app, vendor.id, "80.00").await;
    let withdrawal_id = body["data"]["id"].as_str().unwrap().to_string();

    // Approval does not move money.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/withdrawals/{withdrawal_id}/approve"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let token = app.token_for(vendor.id, UserRole::Vendor);
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/vendors/{}/earnings", vendor.id),
            None,
            Some(&token),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(dec_field(&body["data"]["available_withdrawal"]), dec!(100));

    // Payment requires the settlement reference and debits the balance.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/withdrawals/{withdrawal_id}/pay"),
            Some(json!({"settlement_reference": "TXN-2024-0042"})),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["settlement_reference"], "TXN-2024-0042");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/vendors/{}/earnings", vendor.id),
            None,
            Some(&token),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(dec_field(&body["data"]["available_withdrawal"]), dec!(20));
    // Total earnings are a lifetime figure; payment does not reduce them.
    assert_eq!(dec_field(&body["data"]["total_earnings"]), dec!(100));
}

#[tokio::test]
async fn a_paid_request_is_immutable() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Walnut Works", dec!(50)).await;
    let admin = app.admin_token();

    let (_, body) = create_request(&app, vendor.id, "50.00").await;
    let withdrawal_id = body["data"]["id"].as_str().unwrap().to_string();

    app.request(
        Method::POST,
        &format!("/api/v1/withdrawals/{withdrawal_id}/approve"),
        None,
        Some(&admin),
    )
    .await;
    app.request(
        Method::POST,
        &format!("/api/v1/withdrawals/{withdrawal_id}/pay"),
        Some(json!({"settlement_reference": "TXN-1"})),
        Some(&admin),
    )
    .await;

    for action in ["approve", "reject", "pay"] {
        let body = if action == "pay" {
            Some(json!({"settlement_reference": "TXN-2"}))
        } else if action == "reject" {
            Some(json!({}))
        } else {
            None
        };
        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/withdrawals/{withdrawal_id}/{action}"),
                body,
                Some(&admin),
            )
            .await;
        assert_eq!(
            response.status(),
            StatusCode::CONFLICT,
            "paid request must refuse {action}"
        );
    }
}

#[tokio::test]
async fn a_rejected_request_can_be_reapproved() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Walnut Works", dec!(40)).await;
    let admin = app.admin_token();

    let (_, body) = create_request(&app, vendor.id, "25.00").await;
    let withdrawal_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/withdrawals/{withdrawal_id}/reject"),
            Some(json!({"note": "missing bank details"})),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "rejected");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/withdrawals/{withdrawal_id}/approve"),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "approved");
}

#[tokio::test]
async fn pay_is_refused_when_the_balance_no_longer_covers_it() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Walnut Works", dec!(100)).await;
    let admin = app.admin_token();

    // Two requests both fit the balance at creation time.
    let (_, body) = create_request(&app, vendor.id, "80.00").await;
    let first = body["data"]["id"].as_str().unwrap().to_string();
    let (_, body) = create_request(&app, vendor.id, "60.00").await;
    let second = body["data"]["id"].as_str().unwrap().to_string();

    for id in [&first, &second] {
        app.request(
            Method::POST,
            &format!("/api/v1/withdrawals/{id}/approve"),
            None,
            Some(&admin),
        )
        .await;
    }

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/withdrawals/{first}/pay"),
            Some(json!({"settlement_reference": "TXN-A"})),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // 20.00 remains; the second payout must not go through.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/withdrawals/{second}/pay"),
            Some(json!({"settlement_reference": "TXN-B"})),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn vendors_see_only_their_own_requests() {
    let app = TestApp::new().await;
    let vendor_a = app.seed_vendor("Walnut Works", dec!(100)).await;
    let vendor_b = app.seed_vendor("Linen & Co", dec!(100)).await;

    create_request(&app, vendor_a.id, "10.00").await;
    create_request(&app, vendor_b.id, "20.00").await;

    let token = app.token_for(vendor_a.id, UserRole::Vendor);
    let response = app
        .request(Method::GET, "/api/v1/withdrawals", None, Some(&token))
        .await;
    let body = response_json(response).await;
    let requests = body["data"]["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["vendor_id"], vendor_a.id.to_string());

    let response = app
        .request(
            Method::GET,
            "/api/v1/withdrawals",
            None,
            Some(&app.admin_token()),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["requests"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn admin_actions_are_admin_only() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Walnut Works", dec!(100)).await;
    let (_, body) = create_request(&app, vendor.id, "10.00").await;
    let withdrawal_id = body["data"]["id"].as_str().unwrap().to_string();

    let vendor_token = app.token_for(vendor.id, UserRole::Vendor);
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/withdrawals/{withdrawal_id}/approve"),
            None,
            Some(&vendor_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let customer_token = app.token_for(Uuid::new_v4(), UserRole::Customer);
    let response = app
        .request(
            Method::POST,
            "/api/v1/withdrawals",
            Some(json!({"amount": "5.00", "bank_reference": "x"})),
            Some(&customer_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
