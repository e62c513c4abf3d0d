//! HTTP implementation of [`GatewayClient`].
//!
//! Every call carries a bounded timeout and goes through a failsafe circuit
//! breaker; no lock is held while a request is in flight. A timeout maps to
//! [`GatewayError::Timeout`], never to a definite failure.

use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use super::types::*;
use super::{GatewayClient, GatewayError};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Clone)]
pub struct HttpGatewayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    circuit_breaker: Breaker,
}

impl HttpGatewayClient {
    pub fn new(base_url: String, key_id: String, key_secret: String) -> Self {
        Self::with_timeout(
            base_url,
            key_id,
            key_secret,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: String,
        key_id: String,
        key_secret: String,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(30), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(5, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        HttpGatewayClient {
            client,
            base_url,
            key_id,
            key_secret,
            circuit_breaker,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    async fn guarded<T, F>(&self, fut: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match self.circuit_breaker.call(fut).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

fn map_transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    description: String,
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, GatewayError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|b| b.error.description)
            .unwrap_or(text);
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn create_order(&self, req: CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let url = self.url("/orders");
        let client = self.client.clone();
        let (key, secret) = (self.key_id.clone(), self.key_secret.clone());
        self.guarded(async move {
            let resp = client
                .post(&url)
                .basic_auth(&key, Some(&secret))
                .json(&req)
                .send()
                .await
                .map_err(map_transport)?;
            read_json(resp).await
        })
        .await
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let url = self.url(&format!("/payments/{}", payment_id));
        let client = self.client.clone();
        let (key, secret) = (self.key_id.clone(), self.key_secret.clone());
        let raw: RawGatewayPayment = self
            .guarded(async move {
                let resp = client
                    .get(&url)
                    .basic_auth(&key, Some(&secret))
                    .send()
                    .await
                    .map_err(map_transport)?;
                read_json(resp).await
            })
            .await?;
        raw.normalize()
    }

    async fn capture_payment(
        &self,
        payment_id: &str,
        amount_minor: i64,
    ) -> Result<GatewayPayment, GatewayError> {
        let url = self.url(&format!("/payments/{}/capture", payment_id));
        let client = self.client.clone();
        let (key, secret) = (self.key_id.clone(), self.key_secret.clone());
        let body = serde_json::json!({ "amount": amount_minor });
        let raw: RawGatewayPayment = self
            .guarded(async move {
                let resp = client
                    .post(&url)
                    .basic_auth(&key, Some(&secret))
                    .json(&body)
                    .send()
                    .await
                    .map_err(map_transport)?;
                read_json(resp).await
            })
            .await?;
        raw.normalize()
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        req: RefundRequest,
    ) -> Result<GatewayRefund, GatewayError> {
        let url = self.url(&format!("/payments/{}/refund", payment_id));
        let client = self.client.clone();
        let (key, secret) = (self.key_id.clone(), self.key_secret.clone());
        self.guarded(async move {
            let resp = client
                .post(&url)
                .basic_auth(&key, Some(&secret))
                .json(&req)
                .send()
                .await
                .map_err(map_transport)?;
            read_json(resp).await
        })
        .await
    }

    async fn create_plan(&self, req: CreatePlanRequest) -> Result<GatewayPlan, GatewayError> {
        let url = self.url("/plans");
        let client = self.client.clone();
        let (key, secret) = (self.key_id.clone(), self.key_secret.clone());
        self.guarded(async move {
            let resp = client
                .post(&url)
                .basic_auth(&key, Some(&secret))
                .json(&req)
                .send()
                .await
                .map_err(map_transport)?;
            read_json(resp).await
        })
        .await
    }

    async fn create_subscription(
        &self,
        req: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError> {
        let url = self.url("/subscriptions");
        let client = self.client.clone();
        let (key, secret) = (self.key_id.clone(), self.key_secret.clone());
        self.guarded(async move {
            let resp = client
                .post(&url)
                .basic_auth(&key, Some(&secret))
                .json(&req)
                .send()
                .await
                .map_err(map_transport)?;
            read_json(resp).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> HttpGatewayClient {
        HttpGatewayClient::new(server.url(), "key_test".into(), "secret_test".into())
    }

    #[tokio::test]
    async fn create_order_returns_gateway_order() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/orders")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"order_G123","status":"created","amount":10000,"currency":"INR"}"#,
            )
            .create_async()
            .await;

        let order = client_for(&server)
            .create_order(CreateOrderRequest {
                amount: 10_000,
                currency: "INR".into(),
                receipt: "receipt_1".into(),
                notes: None,
            })
            .await
            .unwrap();

        assert_eq!(order.id, "order_G123");
        assert_eq!(order.amount, 10_000);
    }

    #[tokio::test]
    async fn fetch_payment_normalizes_method() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/payments/pay_1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "id":"pay_1","order_id":"order_G123","status":"captured",
                    "amount":10000,"currency":"INR","method":"upi",
                    "vpa":"student@upi","fee":200,"tax":36
                }"#,
            )
            .create_async()
            .await;

        let payment = client_for(&server).fetch_payment("pay_1").await.unwrap();
        assert_eq!(payment.status, GatewayPaymentStatus::Captured);
        assert_eq!(
            payment.method,
            crate::domain::PaymentMethod::Upi {
                handle: "student@upi".into()
            }
        );
    }

    #[tokio::test]
    async fn api_error_carries_status_and_description() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/orders")
            .with_status(400)
            .with_body(r#"{"error":{"description":"amount too small"}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .create_order(CreateOrderRequest {
                amount: 1,
                currency: "INR".into(),
                receipt: "receipt_2".into(),
                notes: None,
            })
            .await
            .unwrap_err();

        match err {
            GatewayError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "amount too small");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn circuit_starts_closed() {
        let client =
            HttpGatewayClient::new("http://localhost:1".into(), "k".into(), "s".into());
        assert_eq!(client.circuit_state(), "closed");
    }
}
