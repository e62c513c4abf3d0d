//! Shared test harness: a scripted gateway double, a recording notifier,
//! and an app wired over the in-memory adapters.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use tiffin_core::adapters::InMemoryStore;
use tiffin_core::cache::{CacheError, InMemoryPaymentOrderCache, PaymentOrderCache};
use tiffin_core::domain::{Order, OrderStatus, PaymentMethod, PaymentOrder};
use tiffin_core::gateway::{
    CreateOrderRequest, CreatePlanRequest, CreateSubscriptionRequest, GatewayClient,
    GatewayError, GatewayOrder, GatewayPayment, GatewayPaymentStatus, GatewayPlan,
    GatewayRefund, GatewaySubscription, RefundRequest,
};
use tiffin_core::idempotency::InMemoryIdempotencyStore;
use tiffin_core::notify::Notifier;
use tiffin_core::services::{
    CaptureEngine, OrderStateMachine, PaymentOrderManager, PaymentOrderPolicy, RefundProcessor,
    SubscriptionService, WebhookProcessor,
};
use tiffin_core::{create_app, signature, AppState};

pub const PAYMENT_SECRET: &[u8] = b"test-payment-secret";
pub const WEBHOOK_SECRET: &[u8] = b"test-webhook-secret";

// --- Gateway double ---

#[derive(Debug, Clone)]
pub struct ScriptedPayment {
    pub status: GatewayPaymentStatus,
    pub amount: i64,
}

#[derive(Default)]
pub struct MockGateway {
    payments: Mutex<HashMap<String, ScriptedPayment>>,
    pub calls: Mutex<Vec<String>>,
    pub fail_create_order: AtomicBool,
    counter: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_payment(&self, payment_id: &str, status: GatewayPaymentStatus, amount: i64) {
        self.payments
            .lock()
            .unwrap()
            .insert(payment_id.into(), ScriptedPayment { status, amount });
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_named(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.into());
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}_{:04}", prefix, n)
    }

    fn payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let payments = self.payments.lock().unwrap();
        let scripted = payments.get(payment_id).ok_or(GatewayError::Api {
            status: 404,
            message: format!("payment {} not found", payment_id),
        })?;
        Ok(GatewayPayment {
            id: payment_id.into(),
            order_id: "order_unused".into(),
            status: scripted.status,
            amount: scripted.amount,
            currency: "INR".into(),
            method: PaymentMethod::Upi {
                handle: "student@upi".into(),
            },
            fee: scripted.amount / 50,
            tax: 0,
        })
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    async fn create_order(&self, req: CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        self.record("create_order");
        if self.fail_create_order.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 500,
                message: "gateway unavailable".into(),
            });
        }
        Ok(GatewayOrder {
            id: self.next_id("order_MOCK"),
            status: "created".into(),
            amount: req.amount,
            currency: req.currency,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        self.record("fetch_payment");
        self.payment(payment_id)
    }

    async fn capture_payment(
        &self,
        payment_id: &str,
        amount_minor: i64,
    ) -> Result<GatewayPayment, GatewayError> {
        self.record("capture_payment");
        {
            let mut payments = self.payments.lock().unwrap();
            let scripted = payments.get_mut(payment_id).ok_or(GatewayError::Api {
                status: 404,
                message: format!("payment {} not found", payment_id),
            })?;
            scripted.status = GatewayPaymentStatus::Captured;
            scripted.amount = amount_minor;
        }
        self.payment(payment_id)
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        req: RefundRequest,
    ) -> Result<GatewayRefund, GatewayError> {
        self.record("refund_payment");
        Ok(GatewayRefund {
            id: self.next_id("rfnd_MOCK"),
            payment_id: payment_id.into(),
            amount: req.amount,
            currency: "INR".into(),
            status: "pending".into(),
        })
    }

    async fn create_plan(&self, req: CreatePlanRequest) -> Result<GatewayPlan, GatewayError> {
        self.record("create_plan");
        Ok(GatewayPlan {
            id: self.next_id("plan_MOCK"),
            period: req.period,
            interval: req.interval,
        })
    }

    async fn create_subscription(
        &self,
        req: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError> {
        self.record("create_subscription");
        Ok(GatewaySubscription {
            id: self.next_id("sub_MOCK"),
            plan_id: req.plan_id,
            status: "created".into(),
            current_end: None,
        })
    }
}

// --- Recording notifier ---

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(Uuid, OrderStatus, OrderStatus)>>,
}

impl RecordingNotifier {
    pub fn transitions_for(&self, order_id: Uuid) -> Vec<(OrderStatus, OrderStatus)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == order_id)
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn order_status_changed(&self, order: &Order, previous: OrderStatus) {
        self.events
            .lock()
            .unwrap()
            .push((order.id, previous, order.status));
    }
}

// --- Failing cache (log-and-bypass path) ---

pub struct FailingCache;

#[async_trait]
impl PaymentOrderCache for FailingCache {
    async fn get(&self, _: &str) -> Result<Option<PaymentOrder>, CacheError> {
        Err(CacheError("connection refused".into()))
    }
    async fn put(&self, _: &PaymentOrder, _: std::time::Duration) -> Result<(), CacheError> {
        Err(CacheError("connection refused".into()))
    }
    async fn invalidate(&self, _: &str) -> Result<(), CacheError> {
        Err(CacheError("connection refused".into()))
    }
}

// --- App harness ---

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn test_app() -> TestApp {
    test_app_with_cache(Arc::new(InMemoryPaymentOrderCache::new()))
}

pub fn test_app_with_cache(cache: Arc<dyn PaymentOrderCache>) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(MockGateway::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let idempotency = Arc::new(InMemoryIdempotencyStore::new());

    let payment_orders = Arc::new(PaymentOrderManager::new(
        gateway.clone(),
        store.clone(),
        store.clone(),
        cache.clone(),
        PaymentOrderPolicy::default(),
    ));
    let refunds = Arc::new(RefundProcessor::new(
        gateway.clone(),
        store.clone(),
        store.clone(),
    ));
    let orders = Arc::new(OrderStateMachine::new(
        store.clone(),
        store.clone(),
        refunds.clone(),
        notifier.clone(),
    ));
    let capture = Arc::new(CaptureEngine::new(
        gateway.clone(),
        store.clone(),
        store.clone(),
        cache.clone(),
        orders.clone(),
        PAYMENT_SECRET,
    ));
    let webhooks = Arc::new(WebhookProcessor::new(
        WEBHOOK_SECRET,
        idempotency.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        cache,
    ));
    let subscriptions = Arc::new(SubscriptionService::new(
        gateway.clone(),
        store.clone(),
        store.clone(),
    ));

    let state = AppState {
        payment_orders,
        capture,
        refunds,
        webhooks,
        subscriptions,
        orders,
        idempotency,
    };

    TestApp {
        app: create_app(state.clone()),
        state,
        store,
        gateway,
        notifier,
    }
}

impl TestApp {
    pub fn seed_user(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store.seed_user(user_id);
        user_id
    }

    pub fn seed_pending_order(&self, user_id: Uuid, amount_minor: i64) -> Uuid {
        let order = Order {
            id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            total_amount_minor: amount_minor,
            user_id,
            student_id: "S-1001".into(),
            delivery_time: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = order.id;
        self.store.seed_order(order);
        id
    }
}

// --- HTTP helpers ---

pub async fn request_full(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let response_headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, response_headers, value)
}

pub async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let (status, _, value) = request_full(app, method, uri, body, headers).await;
    (status, value)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    request(app, "POST", uri, Some(body), &[]).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    request(app, "GET", uri, None, &[]).await
}

/// Deliver a signed webhook body to the endpoint.
pub async fn deliver_webhook(app: &Router, body: &Value) -> (StatusCode, Value) {
    let raw = body.to_string();
    let sig = signature::sign(raw.as_bytes(), WEBHOOK_SECRET);
    request(
        app,
        "POST",
        "/webhooks/payment",
        Some(body.clone()),
        &[("x-webhook-signature", sig.as_str())],
    )
    .await
}

pub fn capture_signature(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    signature::sign(
        format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes(),
        PAYMENT_SECRET,
    )
}
