use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    pub gateway_payment_id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn create_refund(
    State(state): State<AppState>,
    Json(req): Json<CreateRefundRequest>,
) -> Result<impl IntoResponse, AppError> {
    let refund = state
        .refunds
        .create_refund(&req.gateway_payment_id, req.amount, req.reason)
        .await?;
    Ok(Json(refund))
}
