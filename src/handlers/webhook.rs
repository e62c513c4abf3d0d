use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::WebhookDisposition;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.webhooks.handle(&body, signature).await {
        WebhookDisposition::Rejected { message } => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": message })),
        )
            .into_response(),
        WebhookDisposition::Processed { message } => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": message })),
        )
            .into_response(),
        WebhookDisposition::Retry { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": message })),
        )
            .into_response(),
        WebhookDisposition::Replayed { status_code, body } => {
            let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::OK);
            (
                status,
                [
                    ("x-idempotency-cached", "true"),
                    (header::CONTENT_TYPE.as_str(), "application/json"),
                ],
                body,
            )
                .into_response()
        }
    }
}
