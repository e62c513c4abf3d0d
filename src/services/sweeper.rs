//! Periodic sweep closing payment orders that were never paid.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::PaymentOrderCache;
use crate::ports::PaymentOrderStore;

pub struct ExpirySweeper {
    store: Arc<dyn PaymentOrderStore>,
    cache: Arc<dyn PaymentOrderCache>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn PaymentOrderStore>,
        cache: Arc<dyn PaymentOrderCache>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            interval,
        }
    }

    /// One pass: expire due orders and drop their cache entries.
    pub async fn sweep_once(&self) -> usize {
        let expired = match self.store.expire_due(Utc::now()).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!(error = %e, "expiry sweep failed");
                return 0;
            }
        };

        for order in &expired {
            if let Err(e) = self.cache.invalidate(&order.gateway_order_id).await {
                tracing::warn!(
                    gateway_order_id = %order.gateway_order_id,
                    error = %e,
                    "cache invalidation failed during sweep"
                );
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired unpaid payment orders");
        }
        expired.len()
    }

    /// Long-running loop; spawn from `main`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }
}
