//! Order state machine service: the transition table under real storage,
//! with notifications on every successful move.

mod common;

use common::{test_app, TestApp};
use tiffin_core::domain::OrderStatus;
use tiffin_core::error::AppError;
use uuid::Uuid;

fn seeded_order(harness: &TestApp) -> Uuid {
    let user_id = harness.seed_user();
    harness.seed_pending_order(user_id, 10_000)
}

#[tokio::test]
async fn full_lifecycle_walk_succeeds() {
    let harness = test_app();
    let order_id = seeded_order(&harness);

    for target in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivered,
        OrderStatus::Completed,
    ] {
        let order = harness.state.orders.transition(order_id, target).await.unwrap();
        assert_eq!(order.status, target);
    }

    assert_eq!(
        harness.store.order(order_id).unwrap().status,
        OrderStatus::Completed
    );
    assert_eq!(harness.notifier.transitions_for(order_id).len(), 5);
}

#[tokio::test]
async fn pending_to_delivered_is_invalid() {
    let harness = test_app();
    let order_id = seeded_order(&harness);

    let err = harness
        .state
        .orders
        .transition(order_id, OrderStatus::Delivered)
        .await
        .unwrap_err();

    match err {
        AppError::InvalidTransition { from, to } => {
            assert_eq!(from, OrderStatus::Pending);
            assert_eq!(to, OrderStatus::Delivered);
        }
        other => panic!("expected InvalidTransition, got {:?}", other),
    }
    // Failed transitions notify no one.
    assert!(harness.notifier.transitions_for(order_id).is_empty());
    assert_eq!(
        harness.store.order(order_id).unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn cancellation_after_ready_is_refused() {
    let harness = test_app();
    let order_id = seeded_order(&harness);

    for target in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
    ] {
        harness.state.orders.transition(order_id, target).await.unwrap();
    }

    let err = harness
        .state
        .orders
        .transition(order_id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
    assert_eq!(
        harness.store.order(order_id).unwrap().status,
        OrderStatus::Ready
    );
}

#[tokio::test]
async fn terminal_states_refuse_everything() {
    let harness = test_app();
    let order_id = seeded_order(&harness);
    harness
        .state
        .orders
        .transition(order_id, OrderStatus::Cancelled)
        .await
        .unwrap();

    for target in [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Completed,
    ] {
        let err = harness
            .state
            .orders
            .transition(order_id, target)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let harness = test_app();
    let err = harness
        .state
        .orders
        .transition(Uuid::new_v4(), OrderStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_transitions_yield_exactly_one_winner() {
    let harness = test_app();
    let order_id = seeded_order(&harness);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orders = harness.state.orders.clone();
        handles.push(tokio::spawn(async move {
            orders.transition(order_id, OrderStatus::Confirmed).await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(harness.notifier.transitions_for(order_id).len(), 1);
}
