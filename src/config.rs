use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds between evolution passes.
    pub poll_interval_secs: u64,
    /// Predictions loaded per store page during a pass.
    pub page_size: usize,
    /// Day buckets kept per operand in the minutely cache tier.
    pub minutely_cache_capacity: usize,
    /// Year buckets kept per operand in the daily cache tier.
    pub daily_cache_capacity: usize,
    pub binance_base_url: String,
    pub coinbase_base_url: String,
    pub messari_base_url: String,
    /// Endpoint of the post-metadata resolver; empty disables enrichment.
    pub metadata_endpoint: String,
    pub announcements_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let poll_interval_secs = env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .context("Failed to parse POLL_INTERVAL_SECS")?;

        let page_size = env::var("PAGE_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<usize>()
            .context("Failed to parse PAGE_SIZE")?;

        let minutely_cache_capacity = env::var("MINUTELY_CACHE_CAPACITY")
            .unwrap_or_else(|_| "128".to_string())
            .parse::<usize>()
            .context("Failed to parse MINUTELY_CACHE_CAPACITY")?;

        let daily_cache_capacity = env::var("DAILY_CACHE_CAPACITY")
            .unwrap_or_else(|_| "32".to_string())
            .parse::<usize>()
            .context("Failed to parse DAILY_CACHE_CAPACITY")?;

        let binance_base_url = env::var("BINANCE_BASE_URL")
            .unwrap_or_else(|_| "https://api.binance.com".to_string());
        let coinbase_base_url = env::var("COINBASE_BASE_URL")
            .unwrap_or_else(|_| "https://api.exchange.coinbase.com".to_string());
        let messari_base_url = env::var("MESSARI_BASE_URL")
            .unwrap_or_else(|_| "https://data.messari.io".to_string());

        let metadata_endpoint = env::var("METADATA_ENDPOINT").unwrap_or_default();

        let announcements_enabled = env::var("ANNOUNCEMENTS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .context("Failed to parse ANNOUNCEMENTS_ENABLED")?;

        Ok(Config {
            poll_interval_secs,
            page_size,
            minutely_cache_capacity,
            daily_cache_capacity,
            binance_base_url,
            coinbase_base_url,
            messari_base_url,
            metadata_endpoint,
            announcements_enabled,
        })
    }
}
