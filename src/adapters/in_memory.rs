//! In-memory implementation of every storage port, backed by mutex-guarded
//! maps. One struct plays the role of the whole database so the hermetic
//! test suite and local development need no Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    Order, OrderStatus, PaymentOrder, PaymentOrderStatus, PaymentRefund, PaymentTransaction,
    RefundStatus, Subscription, SubscriptionStatus, TransactionStatus,
};
use crate::ports::{
    EventApply, OrderStore, PaymentOrderStore, RefundStore, StoreError, StoreResult,
    SubscriptionStore, TransactionStore, UserDirectory,
};

#[derive(Default)]
pub struct InMemoryStore {
    payment_orders: Mutex<HashMap<Uuid, PaymentOrder>>,
    transactions: Mutex<HashMap<Uuid, PaymentTransaction>>,
    refunds: Mutex<HashMap<Uuid, PaymentRefund>>,
    orders: Mutex<HashMap<Uuid, Order>>,
    subscriptions: Mutex<HashMap<Uuid, Subscription>>,
    users: Mutex<HashSet<Uuid>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, user_id: Uuid) {
        self.users.lock().unwrap().insert(user_id);
    }

    pub fn seed_order(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id, order);
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.orders.lock().unwrap().get(&id).cloned()
    }

    pub fn refunds_for(&self, payment_id: Uuid) -> Vec<PaymentRefund> {
        self.refunds
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.payment_id == payment_id)
            .cloned()
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentOrderStore for InMemoryStore {
    async fn insert(&self, order: &PaymentOrder) -> StoreResult<PaymentOrder> {
        let mut orders = self.payment_orders.lock().unwrap();
        if orders
            .values()
            .any(|o| o.gateway_order_id == order.gateway_order_id)
        {
            return Err(StoreError::Conflict(format!(
                "gateway order {} already recorded",
                order.gateway_order_id
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn find_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> StoreResult<Option<PaymentOrder>> {
        Ok(self
            .payment_orders
            .lock()
            .unwrap()
            .values()
            .find(|o| o.gateway_order_id == gateway_order_id)
            .cloned())
    }

    async fn set_status(&self, id: Uuid, status: PaymentOrderStatus) -> StoreResult<()> {
        let mut orders = self.payment_orders.lock().unwrap();
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound)?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<PaymentOrder>> {
        let mut orders = self.payment_orders.lock().unwrap();
        let mut expired = Vec::new();
        for order in orders.values_mut() {
            if order.status == PaymentOrderStatus::Created && order.expires_at < now {
                order.status = PaymentOrderStatus::Expired;
                order.updated_at = now;
                expired.push(order.clone());
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert_or_get(
        &self,
        tx: &PaymentTransaction,
    ) -> StoreResult<(PaymentTransaction, bool)> {
        let mut transactions = self.transactions.lock().unwrap();
        if let Some(existing) = transactions
            .values()
            .find(|t| t.gateway_payment_id == tx.gateway_payment_id)
        {
            return Ok((existing.clone(), false));
        }
        transactions.insert(tx.id, tx.clone());
        Ok((tx.clone(), true))
    }

    async fn find_by_gateway_payment(
        &self,
        gateway_payment_id: &str,
    ) -> StoreResult<Option<PaymentTransaction>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .values()
            .find(|t| t.gateway_payment_id == gateway_payment_id)
            .cloned())
    }

    async fn find_captured_by_order(
        &self,
        order_id: Uuid,
    ) -> StoreResult<Option<PaymentTransaction>> {
        let payment_order_ids: Vec<Uuid> = self
            .payment_orders
            .lock()
            .unwrap()
            .values()
            .filter(|po| po.order_id == Some(order_id))
            .map(|po| po.id)
            .collect();
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .values()
            .find(|t| {
                payment_order_ids.contains(&t.payment_order_id)
                    && t.status == TransactionStatus::Captured
            })
            .cloned())
    }

    async fn apply_status_event(
        &self,
        gateway_payment_id: &str,
        status: TransactionStatus,
        event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply> {
        let mut transactions = self.transactions.lock().unwrap();
        let tx = match transactions
            .values_mut()
            .find(|t| t.gateway_payment_id == gateway_payment_id)
        {
            Some(tx) => tx,
            None => return Ok(EventApply::NotFound),
        };
        if tx.status_changed_at >= event_at {
            return Ok(EventApply::Stale);
        }
        tx.status = status;
        tx.status_changed_at = event_at;
        tx.version += 1;
        if status == TransactionStatus::Captured && tx.captured_at.is_none() {
            tx.captured_at = Some(event_at);
        }
        Ok(EventApply::Applied)
    }

    async fn mark_refunded(&self, id: Uuid, refunded_at: DateTime<Utc>) -> StoreResult<()> {
        let mut transactions = self.transactions.lock().unwrap();
        let tx = transactions.get_mut(&id).ok_or(StoreError::NotFound)?;
        tx.status = TransactionStatus::Refunded;
        tx.refunded_at = Some(refunded_at);
        tx.status_changed_at = refunded_at;
        tx.version += 1;
        Ok(())
    }
}

#[async_trait]
impl RefundStore for InMemoryStore {
    async fn insert(&self, refund: &PaymentRefund) -> StoreResult<PaymentRefund> {
        self.refunds
            .lock()
            .unwrap()
            .insert(refund.id, refund.clone());
        Ok(refund.clone())
    }

    async fn find_by_gateway_refund(
        &self,
        gateway_refund_id: &str,
    ) -> StoreResult<Option<PaymentRefund>> {
        Ok(self
            .refunds
            .lock()
            .unwrap()
            .values()
            .find(|r| r.gateway_refund_id == gateway_refund_id)
            .cloned())
    }

    async fn refunded_total(&self, payment_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .refunds
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.payment_id == payment_id && r.status != RefundStatus::Failed)
            .map(|r| r.amount_minor)
            .sum())
    }

    async fn apply_processed(
        &self,
        gateway_refund_id: &str,
        processed_at: DateTime<Utc>,
        _event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply> {
        let mut refunds = self.refunds.lock().unwrap();
        let refund = match refunds
            .values_mut()
            .find(|r| r.gateway_refund_id == gateway_refund_id)
        {
            Some(refund) => refund,
            None => return Ok(EventApply::NotFound),
        };
        if refund.status == RefundStatus::Processed {
            return Ok(EventApply::Stale);
        }
        refund.status = RefundStatus::Processed;
        refund.processed_at = Some(processed_at);
        Ok(EventApply::Applied)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.orders.lock().unwrap().get(&id).cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> StoreResult<bool> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound)?;
        if order.status != from {
            return Ok(false);
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn insert(&self, subscription: &Subscription) -> StoreResult<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id, subscription.clone());
        Ok(subscription.clone())
    }

    async fn find_by_gateway_subscription(
        &self,
        gateway_subscription_id: &str,
    ) -> StoreResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.gateway_subscription_id == gateway_subscription_id)
            .cloned())
    }

    async fn apply_charged(
        &self,
        gateway_subscription_id: &str,
        period_end: Option<DateTime<Utc>>,
        event_at: DateTime<Utc>,
    ) -> StoreResult<EventApply> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let sub = match subscriptions
            .values_mut()
            .find(|s| s.gateway_subscription_id == gateway_subscription_id)
        {
            Some(sub) => sub,
            None => return Ok(EventApply::NotFound),
        };
        if sub.status_changed_at >= event_at {
            return Ok(EventApply::Stale);
        }
        sub.status = SubscriptionStatus::Active;
        sub.current_period_end = period_end;
        sub.status_changed_at = event_at;
        Ok(EventApply::Applied)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn exists(&self, user_id: Uuid) -> StoreResult<bool> {
        Ok(self.users.lock().unwrap().contains(&user_id))
    }
}
