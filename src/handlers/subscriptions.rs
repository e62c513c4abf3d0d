use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::CreatePlanRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePlanBody {
    pub period: String,
    pub interval: u32,
    pub item_name: String,
    pub amount: i64,
    pub currency: String,
}

pub async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<CreatePlanBody>,
) -> Result<impl IntoResponse, AppError> {
    let plan = state
        .subscriptions
        .create_plan(CreatePlanRequest {
            period: req.period,
            interval: req.interval,
            item_name: req.item_name,
            amount: req.amount,
            currency: req.currency,
        })
        .await?;
    Ok(Json(plan))
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionBody {
    pub user_id: Uuid,
    pub plan_id: String,
    pub total_count: u32,
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionBody>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = state
        .subscriptions
        .create_subscription(req.user_id, req.plan_id, req.total_count)
        .await?;
    Ok(Json(subscription))
}
