//! Binance spot-market adapter. Serves minutely COIN candlesticks through
//! the public klines endpoint; marketcap ticks are not available here.

use crate::domain::errors::MarketError;
use crate::domain::ports::MarketSource;
use crate::domain::types::{Candlestick, Operand, Provider, Tick};
use crate::infrastructure::http_client::{HttpClientFactory, build_url_with_query};
use async_trait::async_trait;
use chrono::Duration;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
/// Hard page cap imposed by the klines endpoint.
const PAGE_LIMIT: usize = 1000;
/// Binance error code for an unlisted symbol.
const CODE_INVALID_SYMBOL: i64 = -1121;

pub struct BinanceMarketSource {
    client: ClientWithMiddleware,
    base_url: String,
}

impl BinanceMarketSource {
    pub fn builder() -> BinanceMarketSourceBuilder {
        BinanceMarketSourceBuilder::default()
    }
}

#[derive(Default)]
pub struct BinanceMarketSourceBuilder {
    base_url: Option<String>,
}

impl BinanceMarketSourceBuilder {
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn build(self) -> BinanceMarketSource {
        BinanceMarketSource {
            client: HttpClientFactory::create_client(),
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

fn symbol_for(operand: &Operand) -> Result<String, MarketError> {
    match operand {
        Operand::Coin {
            base_asset,
            quote_asset,
            ..
        } => Ok(format!("{base_asset}{quote_asset}")),
        _ => Err(MarketError::InvalidOperand),
    }
}

#[async_trait]
impl MarketSource for BinanceMarketSource {
    fn provider(&self) -> Provider {
        Provider::Binance
    }

    fn patience(&self) -> Duration {
        Duration::minutes(1)
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
        let symbol = symbol_for(operand)?;
        let url = build_url_with_query(
            &format!("{}/api/v3/klines", self.base_url),
            &[
                ("symbol", symbol.as_str()),
                ("interval", &format!("{interval_minutes}m")),
                ("startTime", &(start_time_ts * 1000).to_string()),
                ("limit", &PAGE_LIMIT.to_string()),
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
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(MarketError::RateLimited);
            }
            let body = response.text().await.unwrap_or_default();
            let code = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("code").and_then(|c| c.as_i64()));
            if code == Some(CODE_INVALID_SYMBOL) {
                return Err(MarketError::UnknownMarketPair);
            }
            return Err(MarketError::Provider(format!(
                "Binance klines fetch failed with {status}: {body}"
            )));
        }

        // Klines format: [open time ms, open, high, low, close, volume, ...]
        // with the numeric fields encoded as strings.
        let klines: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| MarketError::Provider(format!("invalid klines response: {e}")))?;

        let candlesticks: Vec<Candlestick> = klines
            .into_iter()
            .filter_map(|k| {
                let arr = k.as_array()?;
                if arr.len() < 6 {
                    return None;
                }
                let timestamp = arr[0].as_i64()? / 1000;
                let open = arr[1].as_str()?.parse::<f64>().ok()?;
                let high = arr[2].as_str()?.parse::<f64>().ok()?;
                let low = arr[3].as_str()?.parse::<f64>().ok()?;
                let close = arr[4].as_str()?.parse::<f64>().ok()?;
                let volume = arr[5].as_str()?.parse::<f64>().ok()?;
                Some(Candlestick {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume,
                })
            })
            .collect();

        debug!("fetched {} Binance candlesticks for {}", candlesticks.len(), symbol);
        Ok(candlesticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_concatenates_base_and_quote() {
        let operand = Operand::Coin {
            provider: Provider::Binance,
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
        };
        assert_eq!(symbol_for(&operand).unwrap(), "BTCUSDT");
    }

    #[test]
    fn test_marketcap_operand_is_rejected() {
        let operand = Operand::MarketCap {
            provider: Provider::Binance,
            base_asset: "BTC".to_string(),
        };
        assert!(matches!(
            symbol_for(&operand),
            Err(MarketError::InvalidOperand)
        ));
    }
}
