//! Payment gateway client boundary.
//!
//! One gateway contract; services hold an `Arc<dyn GatewayClient>` so tests
//! can substitute doubles.

pub mod http;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpGatewayClient;
pub use types::{
    CreateOrderRequest, CreatePlanRequest, CreateSubscriptionRequest, GatewayOrder,
    GatewayPayment, GatewayPaymentStatus, GatewayPlan, GatewayRefund, GatewaySubscription,
    RefundRequest,
};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway rejected the request ({status}): {message}")]
    Api { status: u16, message: String },
    /// The request timed out; the outcome is unknown. The charge may have
    /// succeeded server-side, so re-query gateway state before retrying.
    #[error("gateway request timed out; outcome unknown, re-verify before retrying")]
    Timeout,
    #[error("gateway circuit breaker open")]
    CircuitOpen,
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether the operation definitely did not happen on the gateway side.
    /// `Timeout` is the one case where the caller cannot conclude failure.
    pub fn is_definite_failure(&self) -> bool {
        !matches!(self, GatewayError::Timeout)
    }
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn create_order(&self, req: CreateOrderRequest) -> Result<GatewayOrder, GatewayError>;
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
    async fn capture_payment(
        &self,
        payment_id: &str,
        amount_minor: i64,
    ) -> Result<GatewayPayment, GatewayError>;
    async fn refund_payment(
        &self,
        payment_id: &str,
        req: RefundRequest,
    ) -> Result<GatewayRefund, GatewayError>;
    async fn create_plan(&self, req: CreatePlanRequest) -> Result<GatewayPlan, GatewayError>;
    async fn create_subscription(
        &self,
        req: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError>;
}
