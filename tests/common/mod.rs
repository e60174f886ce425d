#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;
use vendora_api::{
    auth::{AuthService, UserRole},
    clients::courier::{CourierApi, CreateShipmentRequest, ShipmentAck},
    clients::gateway::{CreateSessionRequest, PaymentGateway, PaymentSession},
    config::AppConfig,
    db,
    entities::vendor,
    errors::ServiceError,
    events::{self, EventSender},
    services::notifications::{TracingMailer, TracingNotificationSink},
    services::payment_events::sign_payload,
    AppServices, AppState,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const COURIER_API_KEY: &str = "courier-test-key";

/// Scripted payment gateway: fails the next `fail_times` calls, then issues
/// sequential sessions.
pub struct FakeGateway {
    pub fail_times: AtomicU32,
    pub calls: Mutex<Vec<CreateSessionRequest>>,
    counter: AtomicU32,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            fail_times: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, times: u32) {
        self.fail_times.store(times, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        self.calls.lock().unwrap().push(request);
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::ExternalServiceError(
                "gateway unavailable".to_string(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentSession {
            session_id: format!("cs_test_{n:04}"),
            payment_url: format!("https://pay.test/cs_test_{n:04}"),
        })
    }
}

/// Scripted courier: creation fails for vendors in `fail_vendors`; successful
/// creations get sequential references; every call is recorded.
pub struct FakeCourier {
    pub fail_vendors: Mutex<HashSet<Uuid>>,
    pub created: Mutex<Vec<CreateShipmentRequest>>,
    pub cancelled: Mutex<Vec<String>>,
    counter: AtomicU32,
}

impl FakeCourier {
    pub fn new() -> Self {
        Self {
            fail_vendors: Mutex::new(HashSet::new()),
            created: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
        }
    }

    pub fn fail_for_vendor(&self, vendor_id: Uuid) {
        self.fail_vendors.lock().unwrap().insert(vendor_id);
    }

    pub fn clear_failures(&self) {
        self.fail_vendors.lock().unwrap().clear();
    }

    pub fn created_references(&self) -> Vec<String> {
        // References are assigned in creation order: CR-0001, CR-0002, ...
        (1..=self.counter.load(Ordering::SeqCst))
            .map(|n| format!("CR-{n:04}"))
            .collect()
    }

    pub fn cancelled_references(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl CourierApi for FakeCourier {
    async fn create_shipment(
        &self,
        request: CreateShipmentRequest,
    ) -> Result<ShipmentAck, ServiceError> {
        let vendor_id = request.vendor_id;
        self.created.lock().unwrap().push(request);
        if self.fail_vendors.lock().unwrap().contains(&vendor_id) {
            return Err(ServiceError::ExternalServiceError(
                "courier rejected shipment".to_string(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ShipmentAck {
            success: true,
            reference_no: Some(format!("CR-{n:04}")),
            message: None,
        })
    }

    async fn cancel_shipment(&self, reference_no: &str) -> Result<(), ServiceError> {
        self.cancelled.lock().unwrap().push(reference_no.to_string());
        Ok(())
    }
}

/// Test application backed by a tempdir SQLite database, with scripted
/// gateway and courier clients.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub courier: Arc<FakeCourier>,
    auth: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = TempDir::new().expect("create temp dir for test database");
        let db_path = db_dir.path().join("vendora_test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let mut cfg = AppConfig::new(
            database_url,
            // Unroutable port: the redis fast path must degrade gracefully.
            "redis://127.0.0.1:1".to_string(),
            "test_secret_key_for_testing_purposes_only".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
            COURIER_API_KEY.to_string(),
        );
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.external_retry_attempts = 2;
        cfg.external_retry_base_ms = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            Arc::new(TracingNotificationSink),
            Arc::new(TracingMailer),
        ));

        let redis_client =
            Arc::new(redis::Client::open(cfg.redis_url.clone()).expect("redis url parses"));

        let gateway = Arc::new(FakeGateway::new());
        let courier = Arc::new(FakeCourier::new());

        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            redis_client.clone(),
            gateway.clone(),
            courier.clone(),
            &cfg,
        );

        let auth = Arc::new(AuthService::new(&cfg.jwt_secret, 3600));

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
            auth: auth.clone(),
            redis: redis_client,
        };

        let router = vendora_api::build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            courier,
            auth,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub fn token_for(&self, user_id: Uuid, role: UserRole) -> String {
        self.auth.issue_token(user_id, role).expect("issue token")
    }

    pub fn admin_token(&self) -> String {
        self.token_for(Uuid::new_v4(), UserRole::Admin)
    }

    pub async fn seed_vendor(&self, display_name: &str, available: Decimal) -> vendor::Model {
        self.seed_vendor_with_id(Uuid::new_v4(), display_name, available)
            .await
    }

    /// Deterministic vendor ids let tests rely on vendor-group ordering.
    pub async fn seed_vendor_with_id(
        &self,
        id: Uuid,
        display_name: &str,
        available: Decimal,
    ) -> vendor::Model {
        let now = Utc::now();
        vendor::ActiveModel {
            id: Set(id),
            display_name: Set(display_name.to_string()),
            status: Set(vendora_api::entities::VendorStatus::Approved),
            total_earnings: Set(available),
            available_withdrawal: Set(available),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed vendor")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Delivers a payment webhook signed the way the gateway signs bodies.
    pub async fn post_payment_webhook(&self, event: &Value) -> axum::response::Response {
        let payload = serde_json::to_vec(event).expect("serialize webhook payload");
        let ts = Utc::now().timestamp().to_string();
        let signature = sign_payload(WEBHOOK_SECRET, &ts, &payload);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("x-timestamp", ts)
            .header("x-signature", signature)
            .body(Body::from(payload))
            .expect("build webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook request")
    }

    pub async fn post_payment_webhook_unsigned(&self, event: &Value) -> axum::response::Response {
        let payload = serde_json::to_vec(event).expect("serialize webhook payload");
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("x-timestamp", Utc::now().timestamp().to_string())
            .header("x-signature", "0".repeat(64))
            .body(Body::from(payload))
            .expect("build webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook request")
    }

    pub async fn post_shipment_webhook(
        &self,
        event: &Value,
        api_key: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/shipments/webhook")
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        let request = builder
            .body(Body::from(
                serde_json::to_vec(event).expect("serialize courier event"),
            ))
            .expect("build courier webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during courier webhook request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Money fields serialize as strings; SQLite may drop trailing zeros, so
/// compare numerically.
pub fn dec_field(value: &Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {value}"))
        .parse()
        .expect("parse decimal field")
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response body")
}

/// A two-vendor checkout totalling 100.00 + 10.00 shipping + 5.00 tax.
pub fn two_vendor_cart(vendor_a: Uuid, vendor_b: Uuid) -> Value {
    serde_json::json!({
        "lines": [
            {
                "vendor_id": vendor_a.to_string(),
                "product_name": "Walnut chopping board",
                "sku": "WCB-01",
                "quantity": 2,
                "unit_price": "30.00"
            },
            {
                "vendor_id": vendor_b.to_string(),
                "product_name": "Linen tea towel",
                "sku": "LTT-14",
                "quantity": 4,
                "unit_price": "10.00"
            }
        ],
        "shipping_amount": "10.00",
        "tax_amount": "5.00",
        "currency": "USD",
        "shipping_address": "12 Harbour Lane, Portsmouth",
        "billing_address": "12 Harbour Lane, Portsmouth"
    })
}

/// Gateway event payload for a completed checkout session.
pub fn checkout_completed_event(event_id: &str, order_id: Uuid, customer_id: Uuid) -> Value {
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_evt",
                "metadata": {
                    "order_id": order_id.to_string(),
                    "customer_id": customer_id.to_string(),
                    "purchase_number": "ORD-UNUSED"
                },
                "customer_details": {
                    "email": "buyer@example.com",
                    "name": "Avery Buyer",
                    "address": {"city": "Portsmouth", "line1": "12 Harbour Lane"}
                },
                "shipping_details": {
                    "name": "Avery Buyer",
                    "address": {"city": "Portsmouth", "line1": "12 Harbour Lane"}
                }
            }
        }
    })
}

pub fn payment_failed_event(event_id: &str, order_id: Uuid) -> Value {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.payment_failed",
        "data": {
            "object": {
                "id": "pi_test_evt",
                "metadata": {"order_id": order_id.to_string()}
            }
        }
    })
}

pub fn courier_event(reference_no: &str, status: &str) -> Value {
    serde_json::json!({
        "reference_no": reference_no,
        "status": status,
        "desc": format!("shipment {status}"),
        "event_date_time": Utc::now().to_rfc3339(),
        "hub_name": "Central Hub",
        "rider_name": "K. Rahman",
        "rider_code": "R-118",
        "failure_reason": null,
        "pod_image": null
    })
}
