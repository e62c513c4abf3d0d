use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::NewPaymentOrder;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentOrderRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub order_id: Option<Uuid>,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<serde_json::Value>,
    #[serde(default)]
    pub receipt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentOrderResponse {
    pub payment_order_id: Uuid,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .payment_orders
        .create(NewPaymentOrder {
            user_id: req.user_id,
            order_id: req.order_id,
            amount_minor: req.amount,
            currency: req.currency,
            notes: req.notes,
            receipt: req.receipt,
        })
        .await?;

    Ok(Json(CreatePaymentOrderResponse {
        payment_order_id: order.id,
        gateway_order_id: order.gateway_order_id,
        amount: order.amount_minor,
        currency: order.currency,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    Path(gateway_order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .payment_orders
        .get(&gateway_order_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("payment order {} not found", gateway_order_id))
        })?;
    Ok(Json(order))
}
