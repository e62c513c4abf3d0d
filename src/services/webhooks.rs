//! Gateway webhook processor.
//!
//! Deliveries are at-least-once and unordered. Signature verification runs
//! before anything else, registration on the gateway event id dedupes
//! redeliveries, and the event-timestamp guard in the stores keeps a stale
//! redelivery from regressing a newer status.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::PaymentOrderCache;
use crate::domain::{PaymentOrderStatus, TransactionStatus};
use crate::idempotency::{IdempotencyStore, Registration};
use crate::ports::{
    EventApply, PaymentOrderStore, RefundStore, StoreError, SubscriptionStore, TransactionStore,
};
use crate::signature;

const WEBHOOK_SCOPE: &str = "webhook";
const WEBHOOK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What the HTTP layer should do with a delivery.
#[derive(Debug)]
pub enum WebhookDisposition {
    /// Invalid signature or unparseable body: 400, zero side effects. A 4xx
    /// tells the gateway the delivery is hopeless without inviting a
    /// retry storm.
    Rejected { message: String },
    /// Duplicate delivery: replay the recorded outcome without reprocessing.
    Replayed { status_code: u16, body: String },
    /// Processed (or deliberately ignored): 200, stop redelivery.
    Processed { message: String },
    /// Transient failure: 500 so the gateway redelivers and we retry.
    Retry { message: String },
}

#[derive(Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    created_at: Option<i64>,
    payload: WebhookPayload,
}

#[derive(Deserialize)]
struct WebhookPayload {
    /// Gateway event id; the idempotency key when present.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payment: Option<PaymentEntity>,
    #[serde(default)]
    refund: Option<RefundEntity>,
    #[serde(default)]
    subscription: Option<SubscriptionEntity>,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
}

#[derive(Deserialize)]
struct RefundEntity {
    id: String,
    payment_id: String,
}

#[derive(Deserialize)]
struct SubscriptionEntity {
    id: String,
    #[serde(default)]
    current_period_end: Option<i64>,
}

/// Outcome of one event dispatch. Permanent failures are completed so
/// redelivery stops; transient ones release the registration so the
/// gateway's retry can land.
enum Dispatch {
    Done(String),
    Permanent(String),
    Transient(String),
}

impl From<StoreError> for Dispatch {
    fn from(e: StoreError) -> Self {
        Dispatch::Transient(format!("storage unavailable: {}", e))
    }
}

pub struct WebhookProcessor {
    webhook_secret: Vec<u8>,
    idempotency: Arc<dyn IdempotencyStore>,
    transactions: Arc<dyn TransactionStore>,
    refunds: Arc<dyn RefundStore>,
    payment_orders: Arc<dyn PaymentOrderStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    cache: Arc<dyn PaymentOrderCache>,
}

impl WebhookProcessor {
    pub fn new(
        webhook_secret: impl Into<Vec<u8>>,
        idempotency: Arc<dyn IdempotencyStore>,
        transactions: Arc<dyn TransactionStore>,
        refunds: Arc<dyn RefundStore>,
        payment_orders: Arc<dyn PaymentOrderStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        cache: Arc<dyn PaymentOrderCache>,
    ) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            idempotency,
            transactions,
            refunds,
            payment_orders,
            subscriptions,
            cache,
        }
    }

    pub async fn handle(&self, raw_body: &[u8], signature_header: &str) -> WebhookDisposition {
        if !signature::verify(raw_body, signature_header, &self.webhook_secret) {
            tracing::warn!("webhook rejected: signature verification failed");
            return WebhookDisposition::Rejected {
                message: "invalid signature".into(),
            };
        }

        let envelope: WebhookEnvelope = match serde_json::from_slice(raw_body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "webhook rejected: malformed body");
                return WebhookDisposition::Rejected {
                    message: "malformed event body".into(),
                };
            }
        };

        let event_key = envelope
            .payload
            .id
            .clone()
            .unwrap_or_else(|| hex::encode(Sha256::digest(raw_body)));

        match self
            .idempotency
            .register(WEBHOOK_SCOPE, &event_key, WEBHOOK_TTL)
            .await
        {
            Ok(Registration::New) => {}
            Ok(Registration::InFlight) => {
                return WebhookDisposition::Retry {
                    message: "concurrent delivery in flight".into(),
                };
            }
            Ok(Registration::Replay(record)) => {
                tracing::info!(event = %envelope.event, %event_key, "webhook replayed from cache");
                return WebhookDisposition::Replayed {
                    status_code: record.status_code,
                    body: record.response_body,
                };
            }
            Err(e) => {
                tracing::error!(error = %e, "idempotency registration failed");
                return WebhookDisposition::Retry {
                    message: "idempotency store unavailable".into(),
                };
            }
        }

        let event_at = envelope
            .created_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        let dispatch = self.dispatch(&envelope, event_at).await;
        self.finish(&envelope.event, &event_key, dispatch).await
    }

    async fn finish(
        &self,
        event: &str,
        event_key: &str,
        dispatch: Dispatch,
    ) -> WebhookDisposition {
        match dispatch {
            Dispatch::Done(message) | Dispatch::Permanent(message) => {
                let body = serde_json::json!({ "success": true, "message": message }).to_string();
                if let Err(e) = self
                    .idempotency
                    .complete(WEBHOOK_SCOPE, event_key, 200, body, WEBHOOK_TTL)
                    .await
                {
                    tracing::error!(event, error = %e, "failed to complete idempotency record");
                }
                tracing::info!(event, event_key, outcome = %message, "webhook processed");
                WebhookDisposition::Processed { message }
            }
            Dispatch::Transient(message) => {
                if let Err(e) = self.idempotency.release(WEBHOOK_SCOPE, event_key).await {
                    tracing::error!(event, error = %e, "failed to release idempotency record");
                }
                tracing::warn!(event, event_key, reason = %message, "webhook deferred for redelivery");
                WebhookDisposition::Retry { message }
            }
        }
    }

    async fn dispatch(&self, envelope: &WebhookEnvelope, event_at: DateTime<Utc>) -> Dispatch {
        match envelope.event.as_str() {
            "payment.captured" => self.on_payment_captured(&envelope.payload, event_at).await,
            "payment.failed" => self.on_payment_failed(&envelope.payload, event_at).await,
            "refund.processed" => self.on_refund_processed(&envelope.payload, event_at).await,
            "subscription.charged" => {
                self.on_subscription_charged(&envelope.payload, event_at).await
            }
            other => {
                tracing::info!(event = other, "unrecognized webhook event ignored");
                Dispatch::Done(format!("event {} ignored", other))
            }
        }
    }

    async fn on_payment_captured(
        &self,
        payload: &WebhookPayload,
        event_at: DateTime<Utc>,
    ) -> Dispatch {
        let Some(payment) = payload.payment.as_ref() else {
            return Dispatch::Permanent("missing payment entity".into());
        };

        let applied = match self
            .transactions
            .apply_status_event(&payment.id, TransactionStatus::Captured, event_at)
            .await
        {
            Ok(applied) => applied,
            Err(e) => return e.into(),
        };

        match applied {
            EventApply::Applied => {
                if let Some(gateway_order_id) = payment.order_id.as_deref() {
                    if let Err(e) = self.mark_order_paid(gateway_order_id).await {
                        return e.into();
                    }
                }
                Dispatch::Done(format!("payment {} captured", payment.id))
            }
            EventApply::Stale => Dispatch::Done(format!(
                "stale capture event for payment {} ignored",
                payment.id
            )),
            // The synchronous capture call writes the row; this delivery
            // raced it. Let the gateway redeliver.
            EventApply::NotFound => Dispatch::Transient(format!(
                "transaction for payment {} not yet recorded",
                payment.id
            )),
        }
    }

    async fn on_payment_failed(
        &self,
        payload: &WebhookPayload,
        event_at: DateTime<Utc>,
    ) -> Dispatch {
        let Some(payment) = payload.payment.as_ref() else {
            return Dispatch::Permanent("missing payment entity".into());
        };

        let applied = match self
            .transactions
            .apply_status_event(&payment.id, TransactionStatus::Failed, event_at)
            .await
        {
            Ok(applied) => applied,
            Err(e) => return e.into(),
        };

        match applied {
            EventApply::Applied => Dispatch::Done(format!("payment {} marked failed", payment.id)),
            EventApply::Stale => Dispatch::Done(format!(
                "stale failure event for payment {} ignored",
                payment.id
            )),
            // A failed payment often never had a capture attempt, so no row
            // will ever exist; redelivering forever would be pointless.
            EventApply::NotFound => Dispatch::Permanent(format!(
                "no transaction recorded for failed payment {}",
                payment.id
            )),
        }
    }

    async fn on_refund_processed(
        &self,
        payload: &WebhookPayload,
        event_at: DateTime<Utc>,
    ) -> Dispatch {
        let Some(refund) = payload.refund.as_ref() else {
            return Dispatch::Permanent("missing refund entity".into());
        };

        let now = Utc::now();
        let applied = match self
            .refunds
            .apply_processed(&refund.id, now, event_at)
            .await
        {
            Ok(applied) => applied,
            Err(e) => return e.into(),
        };

        match applied {
            EventApply::Applied => {
                if let Err(e) = self.settle_transaction_refund(&refund.payment_id, now).await {
                    return e.into();
                }
                Dispatch::Done(format!("refund {} processed", refund.id))
            }
            EventApply::Stale => {
                Dispatch::Done(format!("refund {} already processed", refund.id))
            }
            // Refund rows are written synchronously before the gateway
            // confirms; an unknown id is a delivery-order race.
            EventApply::NotFound => {
                Dispatch::Transient(format!("refund {} not yet recorded", refund.id))
            }
        }
    }

    async fn on_subscription_charged(
        &self,
        payload: &WebhookPayload,
        event_at: DateTime<Utc>,
    ) -> Dispatch {
        let Some(subscription) = payload.subscription.as_ref() else {
            return Dispatch::Permanent("missing subscription entity".into());
        };

        let period_end = subscription
            .current_period_end
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        let applied = match self
            .subscriptions
            .apply_charged(&subscription.id, period_end, event_at)
            .await
        {
            Ok(applied) => applied,
            Err(e) => return e.into(),
        };

        match applied {
            EventApply::Applied => Dispatch::Done(format!(
                "subscription {} period advanced",
                subscription.id
            )),
            EventApply::Stale => Dispatch::Done(format!(
                "stale charge event for subscription {} ignored",
                subscription.id
            )),
            EventApply::NotFound => Dispatch::Transient(format!(
                "subscription {} not yet recorded",
                subscription.id
            )),
        }
    }

    async fn mark_order_paid(&self, gateway_order_id: &str) -> Result<(), StoreError> {
        if let Some(order) = self
            .payment_orders
            .find_by_gateway_order(gateway_order_id)
            .await?
        {
            if order.status != PaymentOrderStatus::Paid {
                self.payment_orders
                    .set_status(order.id, PaymentOrderStatus::Paid)
                    .await?;
                if let Err(e) = self.cache.invalidate(gateway_order_id).await {
                    tracing::warn!(gateway_order_id, error = %e, "cache invalidation failed");
                }
            }
        }
        Ok(())
    }

    /// Once cumulative processed refunds cover the captured amount, the
    /// transaction itself becomes refunded.
    async fn settle_transaction_refund(
        &self,
        gateway_payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let Some(tx) = self
            .transactions
            .find_by_gateway_payment(gateway_payment_id)
            .await?
        else {
            tracing::warn!(
                gateway_payment_id,
                "processed refund references unknown transaction"
            );
            return Ok(());
        };

        let total = self.refunds.refunded_total(tx.id).await?;
        if total >= tx.amount_minor && tx.status != TransactionStatus::Refunded {
            self.transactions.mark_refunded(tx.id, now).await?;
            tracing::info!(
                gateway_payment_id,
                transaction_id = %tx.id,
                "transaction fully refunded"
            );
        }
        Ok(())
    }
}
