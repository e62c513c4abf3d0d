//! `Idempotency-Key` middleware for mutating payment endpoints.
//!
//! The header is advisory but recommended: a missing key is tolerated with
//! a warning, a malformed one (anything but a UUID) is rejected, and a
//! replayed one short-circuits with the recorded response plus
//! `X-Idempotency-Cached: true`.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use uuid::Uuid;

use crate::idempotency::Registration;
use crate::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const KEY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub async fn idempotency_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let scope = format!("{} {}", request.method(), request.uri().path());

    let key = match request.headers().get(IDEMPOTENCY_HEADER) {
        Some(value) => match value.to_str().ok().and_then(|k| Uuid::parse_str(k).ok()) {
            Some(key) => key.to_string(),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Idempotency-Key must be a UUID",
                        "status": 400,
                    })),
                )
                    .into_response();
            }
        },
        None => {
            tracing::warn!(%scope, "mutating payment request without Idempotency-Key header");
            return next.run(request).await;
        }
    };

    match state.idempotency.register(&scope, &key, KEY_TTL).await {
        Ok(Registration::New) => {}
        Ok(Registration::InFlight) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "request with this idempotency key is already being processed",
                    "status": 429,
                })),
            )
                .into_response();
        }
        Ok(Registration::Replay(record)) => {
            tracing::info!(%scope, %key, "replaying idempotent response");
            let status = StatusCode::from_u16(record.status_code).unwrap_or(StatusCode::OK);
            return (
                status,
                [
                    ("x-idempotency-cached", "true"),
                    (header::CONTENT_TYPE.as_str(), "application/json"),
                ],
                record.response_body,
            )
                .into_response();
        }
        Err(e) => {
            // The store being down must not block money movement; fail open.
            tracing::error!(%scope, %key, error = %e, "idempotency check failed, proceeding");
            return next.run(request).await;
        }
    }

    let response = next.run(request).await;
    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(%scope, %key, error = %e, "failed to buffer response body");
            let _ = state.idempotency.release(&scope, &key).await;
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "failed to buffer response",
                    "status": 500,
                })),
            )
                .into_response();
        }
    };

    if parts.status.is_success() {
        let body_text = String::from_utf8_lossy(&bytes).into_owned();
        if let Err(e) = state
            .idempotency
            .complete(&scope, &key, parts.status.as_u16(), body_text, KEY_TTL)
            .await
        {
            tracing::error!(%scope, %key, error = %e, "failed to record idempotent response");
        }
    } else {
        // Errors are not cached; drop the placeholder so a retry can land.
        if let Err(e) = state.idempotency.release(&scope, &key).await {
            tracing::error!(%scope, %key, error = %e, "failed to release idempotency key");
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}
