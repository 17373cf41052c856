//! Configuration loading from environment.

use std::env;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub fee_rate_bps: u32,
    pub payout_provider: String,
    pub payout_webhook_secret: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let fee_rate_bps: u32 = env::var("PLATFORM_FEE_BPS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()?;
        if fee_rate_bps > 10_000 {
            anyhow::bail!("PLATFORM_FEE_BPS must be at most 10000");
        }

        let payout_provider =
            env::var("PAYOUT_PROVIDER").unwrap_or_else(|_| "lightning".to_string());

        // Optional on purpose: without it the webhook endpoint answers
        // every delivery with a misconfiguration error instead of
        // processing unauthenticated input.
        let payout_webhook_secret = env::var("PAYOUT_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            port,
            database_url,
            fee_rate_bps,
            payout_provider,
            payout_webhook_secret,
        })
    }
}
