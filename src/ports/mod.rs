//! Storage ports. Services depend on these traits; Postgres adapters live in
//! `crate::adapters::postgres`, in-memory doubles in
//! `crate::adapters::in_memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Order, OrderStatus, PaymentOrder, PaymentOrderStatus, PaymentRefund, PaymentTransaction,
    Subscription, TransactionStatus,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("constraint violation: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db)
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                StoreError::Conflict(db.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of applying a webhook-delivered status event. `Stale` means a
/// newer event already set the status; the caller must not regress it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventApply {
    Applied,
    Stale,
    NotFound,
}

#[async_trait]
pub trait PaymentOrderStore: Send + Sync {
    async fn insert(&self, order: &PaymentOrder) -> StoreResult<PaymentOrder>;
    async fn find_by_gateway_order(&self, gateway_order_id: &str)
        -> StoreResult<Option<PaymentOrder>>;
    async fn set_status(&self, id: Uuid, status: PaymentOrderStatus) -> StoreResult<()>;
    /// Flip `created` orders past their deadline to `expired`, returning the
    /// rows that changed so callers can invalidate caches.
    async fn expire_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<PaymentOrder>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert keyed on `gateway_payment_id`. When a row already exists the
    /// existing row is returned untouched; the bool reports whether an
    /// insert actually happened. Repeat captures stay idempotent.
    async fn insert_or_get(
        &self,
        tx: &PaymentTransaction,
    ) -> StoreResult<(PaymentTransaction, bool)>;
    async fn find_by_gateway_payment(
        &self,
        gateway_payment_id: &str,
    ) -> StoreResult<Option<PaymentTransaction>>;
    /// Captured transaction linked (via its payment order) to the given order.
    async fn find_captured_by_order(&self, order_id: Uuid)
        -> StoreResult<Option<PaymentTransaction>>;
    /// Apply a webhook status event, guarded by the event timestamp so an
    /// older redelivered event never overwrites a newer status.
    async fn apply_status_event(
        &self,
        gateway_payment_id: &str,
        status: TransactionStatus,
        event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply>;
    async fn mark_refunded(&self, id: Uuid, refunded_at: DateTime<Utc>) -> StoreResult<()>;
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    async fn insert(&self, refund: &PaymentRefund) -> StoreResult<PaymentRefund>;
    async fn find_by_gateway_refund(
        &self,
        gateway_refund_id: &str,
    ) -> StoreResult<Option<PaymentRefund>>;
    /// Sum of non-failed refund amounts for a transaction.
    async fn refunded_total(&self, payment_id: Uuid) -> StoreResult<i64>;
    async fn apply_processed(
        &self,
        gateway_refund_id: &str,
        processed_at: DateTime<Utc>,
        event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>>;
    /// Status-guarded update: succeeds only while the row still holds `from`.
    /// Returns false when a concurrent writer got there first.
    async fn transition_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert(&self, subscription: &Subscription) -> StoreResult<Subscription>;
    async fn find_by_gateway_subscription(
        &self,
        gateway_subscription_id: &str,
    ) -> StoreResult<Option<Subscription>>;
    /// Advance the billing period from a `subscription.charged` event.
    async fn apply_charged(
        &self,
        gateway_subscription_id: &str,
        period_end: Option<DateTime<Utc>>,
        event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply>;
}

/// User lookup. Users are managed elsewhere; payment creation only needs to
/// know whether the id resolves.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> StoreResult<bool>;
}
