//! Refund processor. Issues gateway refunds and records them `Pending`;
//! the authoritative completion arrives via the `refund.processed` webhook.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{PaymentRefund, RefundStatus, TransactionStatus};
use crate::error::AppError;
use crate::gateway::{GatewayClient, RefundRequest};
use crate::ports::{RefundStore, TransactionStore};

pub struct RefundProcessor {
    gateway: Arc<dyn GatewayClient>,
    transactions: Arc<dyn TransactionStore>,
    refunds: Arc<dyn RefundStore>,
}

impl RefundProcessor {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        transactions: Arc<dyn TransactionStore>,
        refunds: Arc<dyn RefundStore>,
    ) -> Self {
        Self {
            gateway,
            transactions,
            refunds,
        }
    }

    /// Refund a captured payment. `amount_minor` defaults to the full
    /// captured amount; the cumulative total across refunds must not exceed
    /// what was captured.
    pub async fn create_refund(
        &self,
        gateway_payment_id: &str,
        amount_minor: Option<i64>,
        reason: Option<String>,
    ) -> Result<PaymentRefund, AppError> {
        let tx = self
            .transactions
            .find_by_gateway_payment(gateway_payment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("payment {} not found", gateway_payment_id))
            })?;

        if !matches!(
            tx.status,
            TransactionStatus::Captured | TransactionStatus::Refunded
        ) {
            return Err(AppError::Validation(format!(
                "payment {} is {}, only captured payments can be refunded",
                gateway_payment_id, tx.status
            )));
        }

        let amount = amount_minor.unwrap_or(tx.amount_minor);
        if amount <= 0 {
            return Err(AppError::Validation(
                "refund amount must be positive".into(),
            ));
        }

        let already_refunded = self.refunds.refunded_total(tx.id).await?;
        let available = tx.amount_minor - already_refunded;
        if amount > available {
            return Err(AppError::RefundExceedsCaptured {
                requested: amount,
                available,
            });
        }

        let gateway_refund = self
            .gateway
            .refund_payment(
                gateway_payment_id,
                RefundRequest {
                    amount,
                    notes: reason.clone(),
                },
            )
            .await?;

        let refund = PaymentRefund {
            id: Uuid::new_v4(),
            payment_id: tx.id,
            gateway_refund_id: gateway_refund.id,
            amount_minor: amount,
            currency: tx.currency.clone(),
            status: RefundStatus::Pending,
            reason,
            created_at: Utc::now(),
            processed_at: None,
        };
        let stored = self.refunds.insert(&refund).await?;

        tracing::info!(
            gateway_payment_id,
            refund_id = %stored.id,
            gateway_refund_id = %stored.gateway_refund_id,
            amount_minor = amount,
            "refund created, awaiting gateway confirmation"
        );
        Ok(stored)
    }
}
