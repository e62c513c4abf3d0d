//! Order lifecycle service. Sole writer of `Order.status`; every other
//! component requests transitions through here.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Order, OrderStatus};
use crate::error::AppError;
use crate::notify::Notifier;
use crate::ports::{OrderStore, TransactionStore};
use crate::services::refunds::RefundProcessor;

pub struct OrderStateMachine {
    orders: Arc<dyn OrderStore>,
    transactions: Arc<dyn TransactionStore>,
    refunds: Arc<RefundProcessor>,
    notifier: Arc<dyn Notifier>,
}

impl OrderStateMachine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        transactions: Arc<dyn TransactionStore>,
        refunds: Arc<RefundProcessor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orders,
            transactions,
            refunds,
            notifier,
        }
    }

    /// Move an order to `target`, validating against the transition table.
    ///
    /// The status write is guarded by the previously read status, so a
    /// concurrent writer surfaces as a `Conflict` instead of a lost update.
    /// Cancelling an order with a captured payment triggers a full refund;
    /// the order is cancelled immediately, the refund settles asynchronously.
    pub async fn transition(&self, order_id: Uuid, target: OrderStatus) -> Result<Order, AppError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", order_id)))?;

        if !order.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                from: order.status,
                to: target,
            });
        }

        let updated = self
            .orders
            .transition_status(order_id, order.status, target)
            .await?;
        if !updated {
            return Err(AppError::Conflict(format!(
                "order {} changed status concurrently",
                order_id
            )));
        }

        let previous = order.status;
        let mut order = order;
        order.status = target;

        self.notifier.order_status_changed(&order, previous).await;

        if target == OrderStatus::Cancelled {
            self.refund_on_cancel(&order).await;
        }

        Ok(order)
    }

    async fn refund_on_cancel(&self, order: &Order) {
        let captured = match self.transactions.find_captured_by_order(order.id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %e,
                    "could not look up captured payment for cancelled order; needs reconciliation"
                );
                return;
            }
        };

        let Some(tx) = captured else {
            tracing::info!(order_id = %order.id, "cancelled order had no captured payment");
            return;
        };

        match self
            .refunds
            .create_refund(&tx.gateway_payment_id, None, Some("order cancelled".into()))
            .await
        {
            Ok(refund) => {
                tracing::info!(
                    order_id = %order.id,
                    refund_id = %refund.id,
                    amount_minor = refund.amount_minor,
                    "refund initiated for cancelled order"
                );
            }
            Err(e) => {
                // The cancellation stands; the missing refund is flagged for
                // reconciliation rather than unwinding the transition.
                tracing::error!(
                    order_id = %order.id,
                    gateway_payment_id = %tx.gateway_payment_id,
                    error = %e,
                    "refund for cancelled order failed; needs reconciliation"
                );
            }
        }
    }
}
