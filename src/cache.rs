//! Read-through cache for payment orders, keyed by gateway order id.
//!
//! Cache failures are never fatal: callers log and fall through to storage.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::domain::PaymentOrder;

const KEY_PREFIX: &str = "payment_order";

#[derive(Error, Debug)]
#[error("cache error: {0}")]
pub struct CacheError(pub String);

fn cache_err(e: impl std::fmt::Display) -> CacheError {
    CacheError(e.to_string())
}

#[async_trait]
pub trait PaymentOrderCache: Send + Sync {
    async fn get(&self, gateway_order_id: &str) -> Result<Option<PaymentOrder>, CacheError>;
    async fn put(&self, order: &PaymentOrder, ttl: Duration) -> Result<(), CacheError>;
    async fn invalidate(&self, gateway_order_id: &str) -> Result<(), CacheError>;
}

fn full_key(gateway_order_id: &str) -> String {
    format!("{}:{}", KEY_PREFIX, gateway_order_id)
}

#[derive(Clone)]
pub struct RedisPaymentOrderCache {
    client: redis::Client,
}

impl RedisPaymentOrderCache {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }
}

#[async_trait]
impl PaymentOrderCache for RedisPaymentOrderCache {
    async fn get(&self, gateway_order_id: &str) -> Result<Option<PaymentOrder>, CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(cache_err)?;
        let value: Option<String> = conn.get(full_key(gateway_order_id)).await.map_err(cache_err)?;
        match value {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(cache_err),
            None => Ok(None),
        }
    }

    async fn put(&self, order: &PaymentOrder, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(cache_err)?;
        let json = serde_json::to_string(order).map_err(cache_err)?;
        let _: () = conn
            .set_ex(full_key(&order.gateway_order_id), json, ttl.as_secs())
            .await
            .map_err(cache_err)?;
        Ok(())
    }

    async fn invalidate(&self, gateway_order_id: &str) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(cache_err)?;
        let _: () = conn.del(full_key(gateway_order_id)).await.map_err(cache_err)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPaymentOrderCache {
    entries: Mutex<HashMap<String, (Instant, PaymentOrder)>>,
}

impl InMemoryPaymentOrderCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentOrderCache for InMemoryPaymentOrderCache {
    async fn get(&self, gateway_order_id: &str) -> Result<Option<PaymentOrder>, CacheError> {
        let entries = self.entries.lock().expect("cache map poisoned");
        Ok(entries.get(&full_key(gateway_order_id)).and_then(|(deadline, order)| {
            (*deadline > Instant::now()).then(|| order.clone())
        }))
    }

    async fn put(&self, order: &PaymentOrder, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .lock()
            .expect("cache map poisoned")
            .insert(
                full_key(&order.gateway_order_id),
                (Instant::now() + ttl, order.clone()),
            );
        Ok(())
    }

    async fn invalidate(&self, gateway_order_id: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .expect("cache map poisoned")
            .remove(&full_key(gateway_order_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_order() -> PaymentOrder {
        PaymentOrder::new(
            "order_cache".into(),
            Uuid::new_v4(),
            None,
            10_000,
            "INR".into(),
            "receipt_c".into(),
            None,
        )
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = InMemoryPaymentOrderCache::new();
        let order = sample_order();
        cache.put(&order, Duration::from_secs(300)).await.unwrap();
        let hit = cache.get("order_cache").await.unwrap().unwrap();
        assert_eq!(hit.id, order.id);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = InMemoryPaymentOrderCache::new();
        let order = sample_order();
        cache.put(&order, Duration::from_secs(300)).await.unwrap();
        cache.invalidate("order_cache").await.unwrap();
        assert!(cache.get("order_cache").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_misses() {
        let cache = InMemoryPaymentOrderCache::new();
        let order = sample_order();
        cache.put(&order, Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get("order_cache").await.unwrap().is_none());
    }
}
