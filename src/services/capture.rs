//! Payment capture engine. The sequential failure ladder matters: nothing
//! touches the gateway until the signature over
//! `"{gateway_order_id}|{gateway_payment_id}"` checks out, and nothing
//! unwinds a captured payment once the money has moved.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::PaymentOrderCache;
use crate::domain::{PaymentOrderStatus, PaymentTransaction, TransactionStatus};
use crate::error::AppError;
use crate::gateway::{GatewayClient, GatewayPaymentStatus};
use crate::ports::{PaymentOrderStore, TransactionStore};
use crate::services::orders::OrderStateMachine;
use crate::signature;

pub struct CaptureEngine {
    gateway: Arc<dyn GatewayClient>,
    payment_orders: Arc<dyn PaymentOrderStore>,
    transactions: Arc<dyn TransactionStore>,
    cache: Arc<dyn PaymentOrderCache>,
    state_machine: Arc<OrderStateMachine>,
    signing_secret: Vec<u8>,
}

impl CaptureEngine {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        payment_orders: Arc<dyn PaymentOrderStore>,
        transactions: Arc<dyn TransactionStore>,
        cache: Arc<dyn PaymentOrderCache>,
        state_machine: Arc<OrderStateMachine>,
        signing_secret: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            gateway,
            payment_orders,
            transactions,
            cache,
            state_machine,
            signing_secret: signing_secret.into(),
        }
    }

    pub async fn capture(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature_hex: &str,
    ) -> Result<PaymentTransaction, AppError> {
        let order = self
            .payment_orders
            .find_by_gateway_order(gateway_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("payment order {} not found", gateway_order_id))
            })?;

        let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
        if !signature::verify(payload.as_bytes(), signature_hex, &self.signing_secret) {
            tracing::warn!(
                gateway_order_id,
                gateway_payment_id,
                "capture rejected: signature verification failed"
            );
            return Err(AppError::SignatureInvalid);
        }

        let payment = self.gateway.fetch_payment(gateway_payment_id).await?;
        let payment = match payment.status {
            GatewayPaymentStatus::Authorized => {
                self.gateway
                    .capture_payment(gateway_payment_id, order.amount_minor)
                    .await?
            }
            // Already captured upstream (webhook raced us, or this is a
            // retry); continue read-only.
            GatewayPaymentStatus::Captured => payment,
            other => return Err(AppError::PaymentNotSuccessful(other.to_string())),
        };

        let now = Utc::now();
        let tx = PaymentTransaction {
            id: Uuid::new_v4(),
            payment_order_id: order.id,
            gateway_payment_id: payment.id.clone(),
            method: payment.method.clone(),
            amount_minor: payment.amount,
            currency: payment.currency.clone(),
            status: TransactionStatus::Captured,
            fee_minor: payment.fee,
            tax_minor: payment.tax,
            captured_at: Some(now),
            refunded_at: None,
            status_changed_at: now,
            version: 1,
            created_at: now,
        };

        let (stored, inserted) = self.transactions.insert_or_get(&tx).await?;
        if !inserted {
            tracing::info!(
                gateway_payment_id,
                transaction_id = %stored.id,
                "capture replayed; transaction already recorded"
            );
            return Ok(stored);
        }

        self.payment_orders
            .set_status(order.id, PaymentOrderStatus::Paid)
            .await?;
        if let Err(e) = self.cache.invalidate(gateway_order_id).await {
            tracing::warn!(gateway_order_id, error = %e, "cache invalidation failed");
        }

        tracing::info!(
            gateway_payment_id,
            transaction_id = %stored.id,
            amount_minor = stored.amount_minor,
            "payment captured"
        );

        if let Some(order_id) = order.order_id {
            if let Err(e) = self
                .state_machine
                .transition(order_id, crate::domain::OrderStatus::Confirmed)
                .await
            {
                // The money has already moved; never unwind the capture.
                tracing::error!(
                    order_id = %order_id,
                    gateway_payment_id,
                    error = %e,
                    "order confirmation failed after capture; needs reconciliation"
                );
            }
        }

        Ok(stored)
    }
}
