use anyhow::Context;
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub gateway_base_url: String,
    pub gateway_key_id: String,
    pub gateway_key_secret: String,
    pub gateway_webhook_secret: String,
    pub min_amount_minor: i64,
    pub default_currency: String,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let config = Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            redis_url: env::var("REDIS_URL").context("REDIS_URL is required")?,
            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .context("GATEWAY_BASE_URL is required")?,
            gateway_key_id: env::var("GATEWAY_KEY_ID").context("GATEWAY_KEY_ID is required")?,
            gateway_key_secret: env::var("GATEWAY_KEY_SECRET")
                .context("GATEWAY_KEY_SECRET is required")?,
            gateway_webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET")
                .context("GATEWAY_WEBHOOK_SECRET is required")?,
            min_amount_minor: env::var("MIN_AMOUNT_MINOR")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("MIN_AMOUNT_MINOR must be an integer")?,
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("SWEEP_INTERVAL_SECS must be an integer")?,
        };

        url::Url::parse(&config.gateway_base_url)
            .context("GATEWAY_BASE_URL is not a valid URL")?;
        if config.min_amount_minor <= 0 {
            anyhow::bail!("MIN_AMOUNT_MINOR must be positive");
        }

        Ok(config)
    }
}
