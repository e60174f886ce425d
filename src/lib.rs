//! Vendora API
//!
//! Multi-vendor commerce backend. The core reconciles one order lifecycle
//! across three independently-progressing sources of truth — a payment
//! gateway, a courier, and vendor fulfillment — and settles vendor
//! commissions exactly once per delivered line item.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

pub use handlers::AppServices;

/// Shared application state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
    pub auth: Arc<auth::AuthService>,
    pub redis: Arc<redis::Client>,
}

/// Uniform success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// Builds the full application router: public health/docs/webhook routes plus
/// the Bearer-authenticated API surface.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/checkout", post(handlers::checkout::begin_checkout))
        .route(
            "/checkout/:order_id/session",
            post(handlers::checkout::resume_checkout),
        )
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/ship", post(handlers::orders::ship_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route("/orders/:id/invoice", get(handlers::orders::order_invoice))
        .route(
            "/withdrawals",
            post(handlers::withdrawals::request_withdrawal)
                .get(handlers::withdrawals::list_withdrawals),
        )
        .route(
            "/withdrawals/:id/approve",
            post(handlers::withdrawals::approve_withdrawal),
        )
        .route(
            "/withdrawals/:id/reject",
            post(handlers::withdrawals::reject_withdrawal),
        )
        .route(
            "/withdrawals/:id/pay",
            post(handlers::withdrawals::pay_withdrawal),
        )
        .route(
            "/vendors/:id/earnings",
            get(handlers::vendors::vendor_earnings),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    // Webhooks authenticate with their own signature/API key, never Bearer.
    let webhooks = Router::new()
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route(
            "/shipments/webhook",
            post(handlers::shipment_webhooks::shipment_webhook),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/docs/openapi.json",
            get(|| async { Json(openapi::openapi_json()) }),
        )
        .nest("/api/v1", protected.merge(webhooks))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
