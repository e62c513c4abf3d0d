use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiffin_core::adapters::{
    PostgresOrderStore, PostgresPaymentOrderStore, PostgresRefundStore,
    PostgresSubscriptionStore, PostgresTransactionStore, PostgresUserDirectory,
};
use tiffin_core::cache::RedisPaymentOrderCache;
use tiffin_core::config::Config;
use tiffin_core::db;
use tiffin_core::gateway::HttpGatewayClient;
use tiffin_core::idempotency::RedisIdempotencyStore;
use tiffin_core::notify::LogNotifier;
use tiffin_core::services::{
    CaptureEngine, ExpirySweeper, OrderStateMachine, PaymentOrderManager, PaymentOrderPolicy,
    RefundProcessor, SubscriptionService, WebhookProcessor,
};
use tiffin_core::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("database migrations completed");

    let gateway = Arc::new(HttpGatewayClient::new(
        config.gateway_base_url.clone(),
        config.gateway_key_id.clone(),
        config.gateway_key_secret.clone(),
    ));
    tracing::info!(base_url = %config.gateway_base_url, "gateway client initialized");

    let payment_order_store = Arc::new(PostgresPaymentOrderStore::new(pool.clone()));
    let transaction_store = Arc::new(PostgresTransactionStore::new(pool.clone()));
    let refund_store = Arc::new(PostgresRefundStore::new(pool.clone()));
    let order_store = Arc::new(PostgresOrderStore::new(pool.clone()));
    let subscription_store = Arc::new(PostgresSubscriptionStore::new(pool.clone()));
    let user_directory = Arc::new(PostgresUserDirectory::new(pool.clone()));

    let cache = Arc::new(RedisPaymentOrderCache::new(&config.redis_url)?);
    let idempotency = Arc::new(RedisIdempotencyStore::new(&config.redis_url)?);
    let notifier = Arc::new(LogNotifier);

    let payment_orders = Arc::new(PaymentOrderManager::new(
        gateway.clone(),
        payment_order_store.clone(),
        user_directory.clone(),
        cache.clone(),
        PaymentOrderPolicy {
            min_amount_minor: config.min_amount_minor,
            default_currency: config.default_currency.clone(),
        },
    ));
    let refunds = Arc::new(RefundProcessor::new(
        gateway.clone(),
        transaction_store.clone(),
        refund_store.clone(),
    ));
    let orders = Arc::new(OrderStateMachine::new(
        order_store,
        transaction_store.clone(),
        refunds.clone(),
        notifier,
    ));
    let capture = Arc::new(CaptureEngine::new(
        gateway.clone(),
        payment_order_store.clone(),
        transaction_store.clone(),
        cache.clone(),
        orders.clone(),
        config.gateway_key_secret.as_bytes(),
    ));
    let webhooks = Arc::new(WebhookProcessor::new(
        config.gateway_webhook_secret.as_bytes(),
        idempotency.clone(),
        transaction_store,
        refund_store,
        payment_order_store.clone(),
        subscription_store.clone(),
        cache.clone(),
    ));
    let subscriptions = Arc::new(SubscriptionService::new(
        gateway,
        subscription_store,
        user_directory,
    ));

    let sweeper = ExpirySweeper::new(
        payment_order_store,
        cache,
        Duration::from_secs(config.sweep_interval_secs),
    );
    tokio::spawn(sweeper.run());

    let state = AppState {
        payment_orders,
        capture,
        refunds,
        webhooks,
        subscriptions,
        orders,
        idempotency,
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
