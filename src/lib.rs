pub mod adapters;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod idempotency;
pub mod middleware;
pub mod notify;
pub mod ports;
pub mod services;
pub mod signature;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::idempotency::IdempotencyStore;
use crate::services::{
    CaptureEngine, OrderStateMachine, PaymentOrderManager, RefundProcessor, SubscriptionService,
    WebhookProcessor,
};

#[derive(Clone)]
pub struct AppState {
    pub payment_orders: Arc<PaymentOrderManager>,
    pub capture: Arc<CaptureEngine>,
    pub refunds: Arc<RefundProcessor>,
    pub webhooks: Arc<WebhookProcessor>,
    pub subscriptions: Arc<SubscriptionService>,
    pub orders: Arc<OrderStateMachine>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

pub fn create_app(state: AppState) -> Router {
    // Capture, refund, and subscription writes honor the Idempotency-Key
    // header; reads and the webhook (which dedupes on the event id) do not.
    let idempotent_routes = Router::new()
        .route("/payments/capture", post(handlers::payments::capture))
        .route("/refunds", post(handlers::refunds::create_refund))
        .route("/plans", post(handlers::subscriptions::create_plan))
        .route(
            "/subscriptions",
            post(handlers::subscriptions::create_subscription),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::idempotency::idempotency_layer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/payment-orders", post(handlers::payment_orders::create))
        .route(
            "/payment-orders/:gateway_order_id",
            get(handlers::payment_orders::get),
        )
        .route("/webhooks/payment", post(handlers::webhook::handle))
        .merge(idempotent_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
