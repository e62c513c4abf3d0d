//! Payment domain entities.
//! Framework-agnostic; rows move through the storage ports in `crate::ports`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifetime of a payment order before the expiry sweep may close it.
pub const PAYMENT_ORDER_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOrderStatus {
    Created,
    Paid,
    Expired,
    Cancelled,
}

impl PaymentOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOrderStatus::Created => "created",
            PaymentOrderStatus::Paid => "paid",
            PaymentOrderStatus::Expired => "expired",
            PaymentOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(PaymentOrderStatus::Created),
            "paid" => Some(PaymentOrderStatus::Paid),
            "expired" => Some(PaymentOrderStatus::Expired),
            "cancelled" => Some(PaymentOrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local record of a payment intent, mirrored to exactly one gateway order.
/// Amounts are minor units (paise).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub id: Uuid,
    pub gateway_order_id: String,
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentOrderStatus,
    pub receipt: String,
    pub notes: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentOrder {
    pub fn new(
        gateway_order_id: String,
        user_id: Uuid,
        order_id: Option<Uuid>,
        amount_minor: i64,
        currency: String,
        receipt: String,
        notes: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            gateway_order_id,
            user_id,
            order_id,
            amount_minor,
            currency,
            status: PaymentOrderStatus::Created,
            receipt,
            notes,
            expires_at: now + Duration::minutes(PAYMENT_ORDER_TTL_MINUTES),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentOrderStatus::Created && now > self.expires_at
    }
}

/// Payment instrument, normalized at the gateway-client boundary from the
/// gateway's loose per-method fields into one tagged shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    Card { network: String, last4: String },
    Upi { handle: String },
    Wallet { provider: String },
    Netbanking { bank: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Authorized,
    Captured,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Authorized => "authorized",
            TransactionStatus::Captured => "captured",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorized" => Some(TransactionStatus::Authorized),
            "captured" => Some(TransactionStatus::Captured),
            "failed" => Some(TransactionStatus::Failed),
            "refunded" => Some(TransactionStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local record of one capture attempt against a payment order.
/// Immutable once captured, except the refund fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub payment_order_id: Uuid,
    pub gateway_payment_id: String,
    pub method: PaymentMethod,
    pub amount_minor: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub fee_minor: i64,
    pub tax_minor: i64,
    pub captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    /// Timestamp of the event that last set `status`; guards against stale
    /// webhook redeliveries regressing a newer status.
    pub status_changed_at: DateTime<Utc>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Processed => "processed",
            RefundStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RefundStatus::Pending),
            "processed" => Some(RefundStatus::Processed),
            "failed" => Some(RefundStatus::Failed),
            _ => None,
        }
    }
}

/// A refund against a captured transaction. Created `Pending`; the
/// authoritative completion arrives later via the `refund.processed` webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub gateway_refund_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: RefundStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
