//! Messari adapter. Serves daily MARKETCAP ticks from the asset metrics
//! time-series endpoint; candlesticks are not available here.

use crate::domain::errors::MarketError;
use crate::domain::ports::MarketSource;
use crate::domain::types::{Candlestick, Operand, Provider, Tick};
use crate::infrastructure::http_client::{HttpClientFactory, build_url_with_query};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://data.messari.io";
/// One page of daily points.
const PAGE_DAYS: i64 = 90;

pub struct MessariMarketSource {
    client: ClientWithMiddleware,
    base_url: String,
}

impl MessariMarketSource {
    pub fn builder() -> MessariMarketSourceBuilder {
        MessariMarketSourceBuilder::default()
    }
}

#[derive(Default)]
pub struct MessariMarketSourceBuilder {
    base_url: Option<String>,
}

impl MessariMarketSourceBuilder {
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn build(self) -> MessariMarketSource {
        MessariMarketSource {
            client: HttpClientFactory::create_client(),
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct TimeSeriesResponse {
    data: TimeSeriesData,
}

#[derive(Deserialize)]
struct TimeSeriesData {
    values: Option<Vec<(i64, f64)>>,
}

fn asset_for(operand: &Operand) -> Result<String, MarketError> {
    match operand {
        Operand::MarketCap { base_asset, .. } => Ok(base_asset.to_lowercase()),
        _ => Err(MarketError::InvalidOperand),
    }
}

fn date(ts: i64) -> Result<String, MarketError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .ok_or_else(|| MarketError::Provider(format!("timestamp {ts} out of range")))
}

#[async_trait]
impl MarketSource for MessariMarketSource {
    fn provider(&self) -> Provider {
        Provider::Messari
    }

    fn patience(&self) -> Duration {
        Duration::days(1)
    }

    async fn request_ticks(
        &self,
        operand: &Operand,
        start_time_ts: i64,
    ) -> Result<Vec<Tick>, MarketError> {
        let asset = asset_for(operand)?;
        let end_ts = start_time_ts + PAGE_DAYS * 86_400;
        let url = build_url_with_query(
            &format!(
                "{}/api/v1/assets/{}/metrics/marketcap.current/time-series",
                self.base_url, asset
            ),
            &[
                ("start", date(start_time_ts)?.as_str()),
                ("end", &date(end_ts)?),
                ("interval", "1d"),
            ],
        )
        .map_err(|e| MarketError::Provider(e.to_string()))?;

        let response = self
            .client
            .get(&url)
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
                        "Messari time-series fetch failed with {status}: {body}"
                    )))
                }
            };
        }

        let parsed: TimeSeriesResponse = response
            .json()
            .await
            .map_err(|e| MarketError::Provider(format!("invalid time-series response: {e}")))?;

        let ticks: Vec<Tick> = parsed
            .data
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|(ts_ms, value)| Tick {
                timestamp: ts_ms / 1000,
                value,
            })
            .collect();

        debug!("fetched {} Messari marketcap ticks for {}", ticks.len(), asset);
        Ok(ticks)
    }

    async fn request_candlesticks(
        &self,
        _operand: &Operand,
        _start_time_ts: i64,
        _interval_minutes: u32,
    ) -> Result<Vec<Candlestick>, MarketError> {
        Err(MarketError::InvalidOperand)
    }
}
