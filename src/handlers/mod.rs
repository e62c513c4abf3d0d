pub mod payment_orders;
pub mod payments;
pub mod refunds;
pub mod subscriptions;
pub mod webhook;

use axum::{response::IntoResponse, Json};
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
