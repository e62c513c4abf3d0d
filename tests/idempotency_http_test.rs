//! Idempotency-Key middleware on the mutating payment endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{capture_signature, post_json, request, request_full, test_app, TestApp};
use tiffin_core::gateway::GatewayPaymentStatus;

async fn prepared_capture_body(harness: &TestApp, payment_id: &str) -> serde_json::Value {
    let user_id = harness.seed_user();
    let (status, created) = post_json(
        &harness.app,
        "/payment-orders",
        json!({ "user_id": user_id, "amount": 10_000 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let gateway_order_id = created["gateway_order_id"].as_str().unwrap();
    harness
        .gateway
        .seed_payment(payment_id, GatewayPaymentStatus::Authorized, 10_000);
    json!({
        "gateway_order_id": gateway_order_id,
        "gateway_payment_id": payment_id,
        "signature": capture_signature(gateway_order_id, payment_id),
    })
}

#[tokio::test]
async fn replayed_key_returns_cached_response_with_header() {
    let harness = test_app();
    let body = prepared_capture_body(&harness, "pay_i1").await;
    let key = Uuid::new_v4().to_string();

    let (first_status, _, first_body) = request_full(
        &harness.app,
        "POST",
        "/payments/capture",
        Some(body.clone()),
        &[("idempotency-key", key.as_str())],
    )
    .await;
    assert_eq!(first_status, StatusCode::OK);

    let (second_status, headers, second_body) = request_full(
        &harness.app,
        "POST",
        "/payments/capture",
        Some(body),
        &[("idempotency-key", key.as_str())],
    )
    .await;

    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(headers.get("x-idempotency-cached").unwrap(), "true");
    assert_eq!(first_body["id"], second_body["id"]);
    // The replay never re-entered the handler.
    assert_eq!(harness.gateway.calls_named("fetch_payment"), 1);
}

#[tokio::test]
async fn malformed_key_is_rejected() {
    let harness = test_app();
    let body = prepared_capture_body(&harness, "pay_i2").await;

    let (status, reply) = request(
        &harness.app,
        "POST",
        "/payments/capture",
        Some(body),
        &[("idempotency-key", "not-a-uuid")],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["error"].as_str().unwrap().contains("UUID"));
    assert_eq!(harness.gateway.calls_named("fetch_payment"), 0);
}

#[tokio::test]
async fn missing_key_is_tolerated() {
    let harness = test_app();
    let body = prepared_capture_body(&harness, "pay_i3").await;

    let (status, _) = post_json(&harness.app, "/payments/capture", body).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn failed_request_is_not_cached_against_the_key() {
    let harness = test_app();
    let key = Uuid::new_v4().to_string();

    // First attempt references a payment order that does not exist.
    let (status, _) = request(
        &harness.app,
        "POST",
        "/payments/capture",
        Some(json!({
            "gateway_order_id": "order_MISSING",
            "gateway_payment_id": "pay_i4",
            "signature": capture_signature("order_MISSING", "pay_i4"),
        })),
        &[("idempotency-key", key.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The key is reusable for the corrected request.
    let body = prepared_capture_body(&harness, "pay_i4").await;
    let (status, _, reply) = request_full(
        &harness.app,
        "POST",
        "/payments/capture",
        Some(body),
        &[("idempotency-key", key.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "captured");
}

#[tokio::test]
async fn distinct_keys_are_processed_independently() {
    let harness = test_app();
    let body = prepared_capture_body(&harness, "pay_i5").await;

    let key_a = Uuid::new_v4().to_string();
    let key_b = Uuid::new_v4().to_string();

    let (status_a, _) = request(
        &harness.app,
        "POST",
        "/payments/capture",
        Some(body.clone()),
        &[("idempotency-key", key_a.as_str())],
    )
    .await;
    let (status_b, _) = request(
        &harness.app,
        "POST",
        "/payments/capture",
        Some(body),
        &[("idempotency-key", key_b.as_str())],
    )
    .await;

    // Both process (the capture itself is idempotent); neither replays.
    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    assert_eq!(harness.gateway.calls_named("fetch_payment"), 2);
    assert_eq!(harness.store.transaction_count(), 1);
}
