//! Recurring billing: plan and subscription creation against the gateway.
//! Period advancement arrives via the `subscription.charged` webhook.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Subscription;
use crate::error::AppError;
use crate::gateway::{CreatePlanRequest, CreateSubscriptionRequest, GatewayClient, GatewayPlan};
use crate::ports::{SubscriptionStore, UserDirectory};

pub struct SubscriptionService {
    gateway: Arc<dyn GatewayClient>,
    store: Arc<dyn SubscriptionStore>,
    users: Arc<dyn UserDirectory>,
}

impl SubscriptionService {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        store: Arc<dyn SubscriptionStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            gateway,
            store,
            users,
        }
    }

    pub async fn create_plan(&self, req: CreatePlanRequest) -> Result<GatewayPlan, AppError> {
        if req.amount <= 0 {
            return Err(AppError::Validation("plan amount must be positive".into()));
        }
        Ok(self.gateway.create_plan(req).await?)
    }

    pub async fn create_subscription(
        &self,
        user_id: Uuid,
        plan_id: String,
        total_count: u32,
    ) -> Result<Subscription, AppError> {
        if !self.users.exists(user_id).await? {
            return Err(AppError::NotFound(format!("user {} not found", user_id)));
        }

        let gateway_subscription = self
            .gateway
            .create_subscription(CreateSubscriptionRequest {
                plan_id: plan_id.clone(),
                total_count,
                notes: None,
            })
            .await?;

        let subscription = Subscription::new(gateway_subscription.id, plan_id, user_id);
        let stored = self.store.insert(&subscription).await?;
        tracing::info!(
            subscription_id = %stored.id,
            gateway_subscription_id = %stored.gateway_subscription_id,
            "subscription created"
        );
        Ok(stored)
    }
}
