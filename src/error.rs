use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::OrderStatus;
use crate::gateway::GatewayError;
use crate::ports::StoreError;

/// Error taxonomy for the payment core. Callers branch on the variant, never
/// on message text. Signature and transition violations are never
/// auto-retried; gateway timeouts are UNKNOWN outcomes, not failures.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("amount {amount} is below the minimum of {minimum}")]
    AmountTooSmall { amount: i64, minimum: i64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid signature")]
    SignatureInvalid,

    #[error("payment not successful: status is {0}")]
    PaymentNotSuccessful(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("refund of {requested} exceeds refundable amount {available}")]
    RefundExceedsCaptured { requested: i64, available: i64 },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AmountTooSmall { .. }
            | AppError::Validation(_)
            | AppError::RefundExceedsCaptured { .. }
            | AppError::SignatureInvalid => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PaymentNotSuccessful(_)
            | AppError::InvalidTransition { .. }
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gateway(GatewayError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a caller may retry the same request verbatim. Validation,
    /// signature, and state-machine failures indicate defect or attack, not
    /// transience.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Gateway(_) | AppError::Store(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
