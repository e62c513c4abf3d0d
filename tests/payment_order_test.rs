//! Payment order creation and cache-through reads.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use common::{get, post_json, test_app, test_app_with_cache, FailingCache};

#[tokio::test]
async fn create_returns_gateway_order_reference() {
    let harness = test_app();
    let user_id = harness.seed_user();

    let (status, body) = post_json(
        &harness.app,
        "/payment-orders",
        json!({ "user_id": user_id, "amount": 10_000 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 10_000);
    assert_eq!(body["currency"], "INR");
    assert!(body["gateway_order_id"]
        .as_str()
        .unwrap()
        .starts_with("order_MOCK"));
    assert_eq!(harness.gateway.calls_named("create_order"), 1);
}

#[tokio::test]
async fn below_minimum_amount_fails_without_gateway_call() {
    let harness = test_app();
    let user_id = harness.seed_user();

    let (status, body) = post_json(
        &harness.app,
        "/payment-orders",
        json!({ "user_id": user_id, "amount": 50 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("below the minimum"));
    assert_eq!(harness.gateway.call_count(), 0);
}

#[tokio::test]
async fn unknown_user_fails_without_gateway_call() {
    let harness = test_app();

    let (status, _) = post_json(
        &harness.app,
        "/payment-orders",
        json!({ "user_id": Uuid::new_v4(), "amount": 10_000 }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(harness.gateway.call_count(), 0);
}

#[tokio::test]
async fn gateway_failure_leaves_no_local_row() {
    let harness = test_app();
    let user_id = harness.seed_user();
    harness
        .gateway
        .fail_create_order
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let (status, _) = post_json(
        &harness.app,
        "/payment-orders",
        json!({ "user_id": user_id, "amount": 10_000 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    // Nothing was persisted, so a lookup by any gateway id misses.
    let (status, _) = get(&harness.app, "/payment-orders/order_MOCK_0000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_reads_through_and_misses_cleanly() {
    let harness = test_app();
    let user_id = harness.seed_user();

    let (_, created) = post_json(
        &harness.app,
        "/payment-orders",
        json!({ "user_id": user_id, "amount": 12_345 }),
    )
    .await;
    let gateway_order_id = created["gateway_order_id"].as_str().unwrap();

    let (status, body) = get(
        &harness.app,
        &format!("/payment-orders/{}", gateway_order_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount_minor"], 12_345);
    assert_eq!(body["status"], "created");

    let (status, _) = get(&harness.app, "/payment-orders/order_NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cache_failure_never_fails_the_read() {
    let harness = test_app_with_cache(Arc::new(FailingCache));
    let user_id = harness.seed_user();

    let (status, created) = post_json(
        &harness.app,
        "/payment-orders",
        json!({ "user_id": user_id, "amount": 10_000 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let gateway_order_id = created["gateway_order_id"].as_str().unwrap();
    let (status, body) = get(
        &harness.app,
        &format!("/payment-orders/{}", gateway_order_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gateway_order_id"], *gateway_order_id);
}

#[tokio::test]
async fn explicit_receipt_and_currency_are_preserved() {
    let harness = test_app();
    let user_id = harness.seed_user();

    let (status, created) = post_json(
        &harness.app,
        "/payment-orders",
        json!({
            "user_id": user_id,
            "amount": 5_000,
            "currency": "USD",
            "receipt": "receipt_custom_1"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["currency"], "USD");

    let gateway_order_id = created["gateway_order_id"].as_str().unwrap();
    let (_, body) = get(
        &harness.app,
        &format!("/payment-orders/{}", gateway_order_id),
    )
    .await;
    assert_eq!(body["receipt"], "receipt_custom_1");
}
