//! Gateway wire types. The gateway reports instrument details as a loose
//! `method` string plus per-method fields; `normalize_method` folds them into
//! the [`PaymentMethod`] tagged union here, once, so nothing downstream ever
//! touches the raw shape.

use serde::{Deserialize, Serialize};

use crate::domain::PaymentMethod;

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Created,
    Authorized,
    Captured,
    Failed,
    Refunded,
}

impl std::fmt::Display for GatewayPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayPaymentStatus::Created => "created",
            GatewayPaymentStatus::Authorized => "authorized",
            GatewayPaymentStatus::Captured => "captured",
            GatewayPaymentStatus::Failed => "failed",
            GatewayPaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// A payment as the rest of the crate sees it: method already normalized.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: String,
    pub status: GatewayPaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub fee: i64,
    pub tax: i64,
}

/// Raw payment entity as the gateway serializes it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGatewayPayment {
    pub id: String,
    pub order_id: String,
    pub status: GatewayPaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    #[serde(default)]
    pub card: Option<RawCard>,
    #[serde(default)]
    pub vpa: Option<String>,
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub tax: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCard {
    pub network: String,
    pub last4: String,
}

impl RawGatewayPayment {
    pub fn normalize(self) -> Result<GatewayPayment, super::GatewayError> {
        let method = normalize_method(&self)?;
        Ok(GatewayPayment {
            id: self.id,
            order_id: self.order_id,
            status: self.status,
            amount: self.amount,
            currency: self.currency,
            method,
            fee: self.fee,
            tax: self.tax,
        })
    }
}

fn normalize_method(raw: &RawGatewayPayment) -> Result<PaymentMethod, super::GatewayError> {
    let missing = |field: &str| {
        super::GatewayError::InvalidResponse(format!(
            "payment {} has method '{}' but no {} field",
            raw.id, raw.method, field
        ))
    };
    match raw.method.as_str() {
        "card" => {
            let card = raw.card.as_ref().ok_or_else(|| missing("card"))?;
            Ok(PaymentMethod::Card {
                network: card.network.clone(),
                last4: card.last4.clone(),
            })
        }
        "upi" => {
            let handle = raw.vpa.clone().ok_or_else(|| missing("vpa"))?;
            Ok(PaymentMethod::Upi { handle })
        }
        "wallet" => {
            let provider = raw.wallet.clone().ok_or_else(|| missing("wallet"))?;
            Ok(PaymentMethod::Wallet { provider })
        }
        "netbanking" => {
            let bank = raw.bank.clone().ok_or_else(|| missing("bank"))?;
            Ok(PaymentMethod::Netbanking { bank })
        }
        other => Err(super::GatewayError::InvalidResponse(format!(
            "unknown payment method '{}' on payment {}",
            other, raw.id
        ))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePlanRequest {
    pub period: String,
    pub interval: u32,
    pub item_name: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPlan {
    pub id: String,
    pub period: String,
    pub interval: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionRequest {
    pub plan_id: String,
    pub total_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySubscription {
    pub id: String,
    pub plan_id: String,
    pub status: String,
    #[serde(default)]
    pub current_end: Option<i64>,
}
