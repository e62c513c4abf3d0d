//! Payment order manager: creates payment intents against the gateway and
//! serves cache-through reads keyed by gateway order id.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::PaymentOrderCache;
use crate::domain::PaymentOrder;
use crate::error::AppError;
use crate::gateway::{CreateOrderRequest, GatewayClient};
use crate::ports::{PaymentOrderStore, UserDirectory};

/// Cache lifetime for payment orders.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct PaymentOrderPolicy {
    pub min_amount_minor: i64,
    pub default_currency: String,
}

impl Default for PaymentOrderPolicy {
    fn default() -> Self {
        Self {
            min_amount_minor: 100,
            default_currency: "INR".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPaymentOrder {
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub amount_minor: i64,
    pub currency: Option<String>,
    pub notes: Option<serde_json::Value>,
    pub receipt: Option<String>,
}

pub struct PaymentOrderManager {
    gateway: Arc<dyn GatewayClient>,
    store: Arc<dyn PaymentOrderStore>,
    users: Arc<dyn UserDirectory>,
    cache: Arc<dyn PaymentOrderCache>,
    policy: PaymentOrderPolicy,
}

impl PaymentOrderManager {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        store: Arc<dyn PaymentOrderStore>,
        users: Arc<dyn UserDirectory>,
        cache: Arc<dyn PaymentOrderCache>,
        policy: PaymentOrderPolicy,
    ) -> Self {
        Self {
            gateway,
            store,
            users,
            cache,
            policy,
        }
    }

    /// Create a payment intent. Validation happens before any gateway call;
    /// the local row is written only after the gateway order exists, so a
    /// gateway failure leaves no orphan row.
    pub async fn create(&self, req: NewPaymentOrder) -> Result<PaymentOrder, AppError> {
        if req.amount_minor < self.policy.min_amount_minor {
            return Err(AppError::AmountTooSmall {
                amount: req.amount_minor,
                minimum: self.policy.min_amount_minor,
            });
        }

        if !self.users.exists(req.user_id).await? {
            return Err(AppError::NotFound(format!(
                "user {} not found",
                req.user_id
            )));
        }

        let currency = req
            .currency
            .unwrap_or_else(|| self.policy.default_currency.clone());
        let receipt = req.receipt.unwrap_or_else(generate_receipt);

        let gateway_order = self
            .gateway
            .create_order(CreateOrderRequest {
                amount: req.amount_minor,
                currency: currency.clone(),
                receipt: receipt.clone(),
                notes: req.notes.clone(),
            })
            .await?;

        let order = PaymentOrder::new(
            gateway_order.id,
            req.user_id,
            req.order_id,
            req.amount_minor,
            currency,
            receipt,
            req.notes,
        );

        let stored = match self.store.insert(&order).await {
            Ok(stored) => stored,
            Err(e) => {
                // The remote order now has no local record; flag it so the
                // reconciliation sweep can cancel or re-link it.
                tracing::error!(
                    gateway_order_id = %order.gateway_order_id,
                    error = %e,
                    "local insert failed after gateway order creation; orphaned remote order"
                );
                return Err(e.into());
            }
        };

        if let Err(e) = self.cache.put(&stored, CACHE_TTL).await {
            tracing::warn!(
                gateway_order_id = %stored.gateway_order_id,
                error = %e,
                "payment order cache write failed"
            );
        }

        tracing::info!(
            payment_order_id = %stored.id,
            gateway_order_id = %stored.gateway_order_id,
            amount_minor = stored.amount_minor,
            "payment order created"
        );
        Ok(stored)
    }

    /// Cache-through read. A cache error is logged and bypassed; it never
    /// fails the read.
    pub async fn get(&self, gateway_order_id: &str) -> Result<Option<PaymentOrder>, AppError> {
        match self.cache.get(gateway_order_id).await {
            Ok(Some(order)) => return Ok(Some(order)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(gateway_order_id, error = %e, "payment order cache read failed");
            }
        }

        let order = self.store.find_by_gateway_order(gateway_order_id).await?;
        if let Some(ref order) = order {
            if let Err(e) = self.cache.put(order, CACHE_TTL).await {
                tracing::warn!(gateway_order_id, error = %e, "payment order cache backfill failed");
            }
        }
        Ok(order)
    }
}

fn generate_receipt() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("receipt_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}
