//! Postgres implementations of the storage ports. Row structs stay private
//! to this module; domain types never carry sqlx derives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Order, OrderStatus, PaymentOrder, PaymentOrderStatus, PaymentRefund, PaymentTransaction,
    RefundStatus, Subscription, SubscriptionStatus, TransactionStatus,
};
use crate::ports::{
    EventApply, OrderStore, PaymentOrderStore, RefundStore, StoreError, StoreResult,
    SubscriptionStore, TransactionStore, UserDirectory,
};

fn bad_column(column: &str, value: &str) -> StoreError {
    StoreError::Database(format!("unrecognized {} value '{}'", column, value))
}

// --- Payment orders ---

#[derive(Clone)]
pub struct PostgresPaymentOrderStore {
    pool: PgPool,
}

impl PostgresPaymentOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentOrderRow {
    id: Uuid,
    gateway_order_id: String,
    user_id: Uuid,
    order_id: Option<Uuid>,
    amount_minor: i64,
    currency: String,
    status: String,
    receipt: String,
    notes: Option<serde_json::Value>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentOrderRow {
    fn into_domain(self) -> StoreResult<PaymentOrder> {
        let status = PaymentOrderStatus::parse(&self.status)
            .ok_or_else(|| bad_column("payment_orders.status", &self.status))?;
        Ok(PaymentOrder {
            id: self.id,
            gateway_order_id: self.gateway_order_id,
            user_id: self.user_id,
            order_id: self.order_id,
            amount_minor: self.amount_minor,
            currency: self.currency,
            status,
            receipt: self.receipt,
            notes: self.notes,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl PaymentOrderStore for PostgresPaymentOrderStore {
    async fn insert(&self, order: &PaymentOrder) -> StoreResult<PaymentOrder> {
        let row = sqlx::query_as::<_, PaymentOrderRow>(
            r#"
            INSERT INTO payment_orders (
                id, gateway_order_id, user_id, order_id, amount_minor, currency,
                status, receipt, notes, expires_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(&order.gateway_order_id)
        .bind(order.user_id)
        .bind(order.order_id)
        .bind(order.amount_minor)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(&order.receipt)
        .bind(&order.notes)
        .bind(order.expires_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await?;
        row.into_domain()
    }

    async fn find_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> StoreResult<Option<PaymentOrder>> {
        let row = sqlx::query_as::<_, PaymentOrderRow>(
            "SELECT * FROM payment_orders WHERE gateway_order_id = $1",
        )
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentOrderRow::into_domain).transpose()
    }

    async fn set_status(&self, id: Uuid, status: PaymentOrderStatus) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE payment_orders SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<PaymentOrder>> {
        let rows = sqlx::query_as::<_, PaymentOrderRow>(
            r#"
            UPDATE payment_orders
            SET status = 'expired', updated_at = $1
            WHERE status = 'created' AND expires_at < $1
            RETURNING *
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PaymentOrderRow::into_domain).collect()
    }
}

// --- Payment transactions ---

#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    payment_order_id: Uuid,
    gateway_payment_id: String,
    method: serde_json::Value,
    amount_minor: i64,
    currency: String,
    status: String,
    fee_minor: i64,
    tax_minor: i64,
    captured_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    status_changed_at: DateTime<Utc>,
    version: i32,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<PaymentTransaction> {
        let status = TransactionStatus::parse(&self.status)
            .ok_or_else(|| bad_column("payment_transactions.status", &self.status))?;
        let method = serde_json::from_value(self.method)
            .map_err(|e| StoreError::Database(format!("bad method json: {}", e)))?;
        Ok(PaymentTransaction {
            id: self.id,
            payment_order_id: self.payment_order_id,
            gateway_payment_id: self.gateway_payment_id,
            method,
            amount_minor: self.amount_minor,
            currency: self.currency,
            status,
            fee_minor: self.fee_minor,
            tax_minor: self.tax_minor,
            captured_at: self.captured_at,
            refunded_at: self.refunded_at,
            status_changed_at: self.status_changed_at,
            version: self.version,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert_or_get(
        &self,
        tx: &PaymentTransaction,
    ) -> StoreResult<(PaymentTransaction, bool)> {
        let method = serde_json::to_value(&tx.method)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let inserted = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO payment_transactions (
                id, payment_order_id, gateway_payment_id, method, amount_minor,
                currency, status, fee_minor, tax_minor, captured_at, refunded_at,
                status_changed_at, version, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (gateway_payment_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(tx.payment_order_id)
        .bind(&tx.gateway_payment_id)
        .bind(method)
        .bind(tx.amount_minor)
        .bind(&tx.currency)
        .bind(tx.status.as_str())
        .bind(tx.fee_minor)
        .bind(tx.tax_minor)
        .bind(tx.captured_at)
        .bind(tx.refunded_at)
        .bind(tx.status_changed_at)
        .bind(tx.version)
        .bind(tx.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.into_domain()?, true));
        }

        let existing = self
            .find_by_gateway_payment(&tx.gateway_payment_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok((existing, false))
    }

    async fn find_by_gateway_payment(
        &self,
        gateway_payment_id: &str,
    ) -> StoreResult<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM payment_transactions WHERE gateway_payment_id = $1",
        )
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_captured_by_order(
        &self,
        order_id: Uuid,
    ) -> StoreResult<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT t.* FROM payment_transactions t
            JOIN payment_orders po ON t.payment_order_id = po.id
            WHERE po.order_id = $1 AND t.status = 'captured'
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TransactionRow::into_domain).transpose()
    }

    async fn apply_status_event(
        &self,
        gateway_payment_id: &str,
        status: TransactionStatus,
        event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = $2,
                status_changed_at = $3,
                version = version + 1,
                captured_at = CASE
                    WHEN $2 = 'captured' AND captured_at IS NULL THEN $3
                    ELSE captured_at
                END
            WHERE gateway_payment_id = $1 AND status_changed_at < $3
            "#,
        )
        .bind(gateway_payment_id)
        .bind(status.as_str())
        .bind(event_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(EventApply::Applied);
        }
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payment_transactions WHERE gateway_payment_id = $1)",
        )
        .bind(gateway_payment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(if exists {
            EventApply::Stale
        } else {
            EventApply::NotFound
        })
    }

    async fn mark_refunded(&self, id: Uuid, refunded_at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'refunded', refunded_at = $2, status_changed_at = $2,
                version = version + 1
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(refunded_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// --- Refunds ---

#[derive(Clone)]
pub struct PostgresRefundStore {
    pool: PgPool,
}

impl PostgresRefundStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    payment_id: Uuid,
    gateway_refund_id: String,
    amount_minor: i64,
    currency: String,
    status: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl RefundRow {
    fn into_domain(self) -> StoreResult<PaymentRefund> {
        let status = RefundStatus::parse(&self.status)
            .ok_or_else(|| bad_column("payment_refunds.status", &self.status))?;
        Ok(PaymentRefund {
            id: self.id,
            payment_id: self.payment_id,
            gateway_refund_id: self.gateway_refund_id,
            amount_minor: self.amount_minor,
            currency: self.currency,
            status,
            reason: self.reason,
            created_at: self.created_at,
            processed_at: self.processed_at,
        })
    }
}

#[async_trait]
impl RefundStore for PostgresRefundStore {
    async fn insert(&self, refund: &PaymentRefund) -> StoreResult<PaymentRefund> {
        let row = sqlx::query_as::<_, RefundRow>(
            r#"
            INSERT INTO payment_refunds (
                id, payment_id, gateway_refund_id, amount_minor, currency,
                status, reason, created_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(refund.id)
        .bind(refund.payment_id)
        .bind(&refund.gateway_refund_id)
        .bind(refund.amount_minor)
        .bind(&refund.currency)
        .bind(refund.status.as_str())
        .bind(&refund.reason)
        .bind(refund.created_at)
        .bind(refund.processed_at)
        .fetch_one(&self.pool)
        .await?;
        row.into_domain()
    }

    async fn find_by_gateway_refund(
        &self,
        gateway_refund_id: &str,
    ) -> StoreResult<Option<PaymentRefund>> {
        let row = sqlx::query_as::<_, RefundRow>(
            "SELECT * FROM payment_refunds WHERE gateway_refund_id = $1",
        )
        .bind(gateway_refund_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RefundRow::into_domain).transpose()
    }

    async fn refunded_total(&self, payment_id: Uuid) -> StoreResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT CAST(COALESCE(SUM(amount_minor), 0) AS BIGINT)
            FROM payment_refunds
            WHERE payment_id = $1 AND status <> 'failed'
            "#,
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn apply_processed(
        &self,
        gateway_refund_id: &str,
        processed_at: DateTime<Utc>,
        _event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply> {
        let result = sqlx::query(
            r#"
            UPDATE payment_refunds
            SET status = 'processed', processed_at = $2
            WHERE gateway_refund_id = $1 AND status = 'pending'
            "#,
        )
        .bind(gateway_refund_id)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(EventApply::Applied);
        }
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payment_refunds WHERE gateway_refund_id = $1)",
        )
        .bind(gateway_refund_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(if exists {
            EventApply::Stale
        } else {
            EventApply::NotFound
        })
    }
}

// --- Orders ---

#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    status: String,
    total_amount_minor: i64,
    user_id: Uuid,
    student_id: String,
    delivery_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_domain(self) -> StoreResult<Order> {
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| bad_column("orders.status", &self.status))?;
        Ok(Order {
            id: self.id,
            status,
            total_amount_minor: self.total_amount_minor,
            user_id: self.user_id,
            student_id: self.student_id,
            delivery_time: self.delivery_time,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OrderRow::into_domain).transpose()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- Subscriptions ---

#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    gateway_subscription_id: String,
    gateway_plan_id: String,
    user_id: Uuid,
    status: String,
    current_period_end: Option<DateTime<Utc>>,
    status_changed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl SubscriptionRow {
    fn into_domain(self) -> StoreResult<Subscription> {
        let status = SubscriptionStatus::parse(&self.status)
            .ok_or_else(|| bad_column("subscriptions.status", &self.status))?;
        Ok(Subscription {
            id: self.id,
            gateway_subscription_id: self.gateway_subscription_id,
            gateway_plan_id: self.gateway_plan_id,
            user_id: self.user_id,
            status,
            current_period_end: self.current_period_end,
            status_changed_at: self.status_changed_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> StoreResult<Subscription> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO subscriptions (
                id, gateway_subscription_id, gateway_plan_id, user_id, status,
                current_period_end, status_changed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(subscription.id)
        .bind(&subscription.gateway_subscription_id)
        .bind(&subscription.gateway_plan_id)
        .bind(subscription.user_id)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_end)
        .bind(subscription.status_changed_at)
        .bind(subscription.created_at)
        .fetch_one(&self.pool)
        .await?;
        row.into_domain()
    }

    async fn find_by_gateway_subscription(
        &self,
        gateway_subscription_id: &str,
    ) -> StoreResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE gateway_subscription_id = $1",
        )
        .bind(gateway_subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SubscriptionRow::into_domain).transpose()
    }

    async fn apply_charged(
        &self,
        gateway_subscription_id: &str,
        period_end: Option<DateTime<Utc>>,
        event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'active', current_period_end = $2, status_changed_at = $3
            WHERE gateway_subscription_id = $1 AND status_changed_at < $3
            "#,
        )
        .bind(gateway_subscription_id)
        .bind(period_end)
        .bind(event_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(EventApply::Applied);
        }
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE gateway_subscription_id = $1)",
        )
        .bind(gateway_subscription_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(if exists {
            EventApply::Stale
        } else {
            EventApply::NotFound
        })
    }
}

// --- Users ---

#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn exists(&self, user_id: Uuid) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}
