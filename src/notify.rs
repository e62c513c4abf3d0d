//! Notification side effect emitted on every successful order transition.
//! Delivery itself (push, SMS, in-app) is an external collaborator behind
//! this trait.

use async_trait::async_trait;

use crate::domain::{Order, OrderStatus};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_status_changed(&self, order: &Order, previous: OrderStatus);
}

/// Default notifier: structured log line per transition.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_status_changed(&self, order: &Order, previous: OrderStatus) {
        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            from = %previous,
            to = %order.status,
            "order status changed"
        );
    }
}
