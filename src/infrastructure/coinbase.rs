//! Coinbase Exchange adapter. Serves minutely COIN candlesticks; the candles
//! endpoint returns newest-first pages of at most 300 rows.

use crate::domain::errors::MarketError;
use crate::domain::ports::MarketSource;
use crate::domain::types::{Candlestick, Operand, Provider, Tick};
use crate::infrastructure::http_client::{HttpClientFactory, build_url_with_query};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";
const PAGE_LIMIT: i64 = 300;

pub struct CoinbaseMarketSource {
    client: ClientWithMiddleware,
    base_url: String,
}

impl CoinbaseMarketSource {
    pub fn builder() -> CoinbaseMarketSourceBuilder {
        CoinbaseMarketSourceBuilder::default()
    }
}

#[derive(Default)]
pub struct CoinbaseMarketSourceBuilder {
    base_url: Option<String>,
}

impl CoinbaseMarketSourceBuilder {
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn build(self) -> CoinbaseMarketSource {
        CoinbaseMarketSource {
            client: HttpClientFactory::create_client(),
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

fn product_for(operand: &Operand) -> Result<String, MarketError> {
    match operand {
        Operand::Coin {
            base_asset,
            quote_asset,
            ..
        } => Ok(format!("{base_asset}-{quote_asset}")),
        _ => Err(MarketError::InvalidOperand),
    }
}

fn iso(ts: i64) -> Result<String, MarketError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| MarketError::Provider(format!("timestamp {ts} out of range")))
}

#[async_trait]
impl MarketSource for CoinbaseMarketSource {
    fn provider(&self) -> Provider {
        Provider::Coinbase
    }

    fn patience(&self) -> Duration {
        Duration::minutes(2)
    }

    async fn request_ticks(
        &self,
        _operand: &Operand,
        _start_time_ts: i64,
    ) -> Result<Vec<Tick>, MarketError> {
        Err(MarketError::InvalidOperand)
    }

    async fn request_candlesticks(
        &self,
        operand: &Operand,
        start_time_ts: i64,
        interval_minutes: u32,
    ) -> Result<Vec<Candlestick>, MarketError> {
        let product = product_for(operand)?;
        let granularity = i64::from(interval_minutes) * 60;
        let end_ts = start_time_ts + PAGE_LIMIT * granularity;
        let url = build_url_with_query(
            &format!("{}/products/{}/candles", self.base_url, product),
            &[
                ("granularity", granularity.to_string().as_str()),
                ("start", &iso(start_time_ts)?),
                ("end", &iso(end_ts)?),
            ],
        )
        .map_err(|e| MarketError::Provider(e.to_string()))?;

        let response = self
            .client
            .get(&url)
            .header("User-Agent", "foretell")
            .send()
            .await
            .map_err(|e| MarketError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return match status {
                StatusCode::NOT_FOUND => Err(MarketError::UnknownMarketPair),
                StatusCode::TOO_MANY_REQUESTS => Err(MarketError::RateLimited),
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    Err(MarketError::Provider(format!(
                        "Coinbase candles fetch failed with {status}: {body}"
                    )))
                }
            };
        }

        // Row format: [time secs, low, high, open, close, volume], newest
        // first.
        let rows: Vec<[f64; 6]> = response
            .json()
            .await
            .map_err(|e| MarketError::Provider(format!("invalid candles response: {e}")))?;

        let mut candlesticks: Vec<Candlestick> = rows
            .into_iter()
            .map(|[time, low, high, open, close, volume]| Candlestick {
                timestamp: time as i64,
                open,
                high,
                low,
                close,
                volume,
            })
            .collect();
        candlesticks.reverse();

        debug!(
            "fetched {} Coinbase candlesticks for {}",
            candlesticks.len(),
            product
        );
        Ok(candlesticks)
    }
}
