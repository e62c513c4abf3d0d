use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

pub async fn capture(
    State(state): State<AppState>,
    Json(req): Json<CaptureRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .capture
        .capture(
            &req.gateway_order_id,
            &req.gateway_payment_id,
            &req.signature,
        )
        .await?;
    Ok(Json(transaction))
}
