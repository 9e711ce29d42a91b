//! Per-operand observation stream: cache-first, provider-fallback, strictly
//! ordered. Every successful `next()` yields timestamps exactly one interval
//! apart, so downstream state machines never see gaps or reordering.

use crate::application::market::cache::TickCache;
use crate::domain::errors::MarketError;
use crate::domain::ports::{Clock, MarketSource};
use crate::domain::types::{Candlestick, Operand, Tick};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

pub struct MarketIterator {
    operand: Operand,
    interval_secs: i64,
    patience_secs: i64,
    next_ts: i64,
    buffer: VecDeque<Candlestick>,
    cache: Arc<TickCache>,
    source: Arc<dyn MarketSource>,
    clock: Arc<dyn Clock>,
}

impl MarketIterator {
    /// `start_from_next` skips the observation at `start_ts` itself, used
    /// when resuming from a condition's persisted `last_ts`.
    pub fn new(
        operand: Operand,
        start_ts: i64,
        start_from_next: bool,
        cache: Arc<TickCache>,
        source: Arc<dyn MarketSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MarketError> {
        let interval_secs = operand.interval_secs().ok_or(MarketError::InvalidOperand)?;
        let start = if start_from_next {
            start_ts + interval_secs
        } else {
            start_ts
        };
        let patience_secs = source.patience().num_seconds();
        Ok(Self {
            operand,
            interval_secs,
            patience_secs,
            next_ts: align_up(start, interval_secs),
            buffer: VecDeque::new(),
            cache,
            source,
            clock,
        })
    }

    /// Timestamp the next successful `next()` will carry.
    pub fn expected_ts(&self) -> i64 {
        self.next_ts
    }

    /// Hand an already-consumed observation back, so a partial multi-operand
    /// pull can be retried without losing data.
    pub fn unread(&mut self, candlestick: Candlestick) {
        self.next_ts = candlestick.timestamp;
        self.buffer.push_front(candlestick);
    }

    pub async fn next(&mut self) -> Result<Candlestick, MarketError> {
        // Within the provider's staleness buffer the data may be incomplete
        // or simply not exist yet; signal softly so the caller defers
        // instead of polling. Checked before the buffer too, so a page
        // fetched earlier never leaks observations past the trust horizon.
        let now = self.clock.now().timestamp();
        if self.next_ts >= now - self.patience_secs - self.interval_secs {
            return Err(MarketError::NoNewDataYet);
        }

        if let Some(candlestick) = self.buffer.pop_front() {
            return Ok(self.emit(candlestick));
        }

        // Cache first, at the exact expected timestamp.
        if let Some(run) = self.cache.get(&self.operand, self.next_ts) {
            self.buffer
                .extend(run.into_iter().map(Candlestick::from_tick));
            let first = self.buffer.pop_front().expect("cache run is never empty");
            return Ok(self.emit(first));
        }

        let page = self.request_page().await?;
        let mut page: Vec<Candlestick> = page
            .into_iter()
            .filter(|c| c.timestamp >= self.next_ts)
            .collect();
        let Some(first) = page.first().copied() else {
            return Err(MarketError::Exhausted);
        };
        if first.timestamp != self.next_ts {
            // The provider skipped over the expected timestamp entirely;
            // nothing from this page can be trusted for ordering.
            return Err(MarketError::OutOfSync {
                expected: self.next_ts,
                actual: first.timestamp,
            });
        }
        gap_fill(&mut page, self.interval_secs);

        // Best-effort write-through; a rejected page only costs a re-fetch.
        let ticks: Vec<Tick> = page
            .iter()
            .map(|c| Tick {
                timestamp: c.timestamp,
                value: c.close,
            })
            .collect();
        if let Err(err) = self.cache.put(&self.operand, &ticks) {
            warn!("failed to cache page for {}: {}", self.operand, err);
        }

        self.buffer.extend(page);
        let first = self.buffer.pop_front().expect("page is never empty here");
        Ok(self.emit(first))
    }

    async fn request_page(&self) -> Result<Vec<Candlestick>, MarketError> {
        match &self.operand {
            Operand::Coin { .. } => {
                self.source
                    .request_candlesticks(&self.operand, self.next_ts, 1)
                    .await
            }
            Operand::MarketCap { .. } => Ok(self
                .source
                .request_ticks(&self.operand, self.next_ts)
                .await?
                .into_iter()
                .map(Candlestick::from_tick)
                .collect()),
            Operand::Number(_) => Err(MarketError::InvalidOperand),
        }
    }

    fn emit(&mut self, candlestick: Candlestick) -> Candlestick {
        self.next_ts = candlestick.timestamp + self.interval_secs;
        candlestick
    }
}

fn align_up(ts: i64, interval: i64) -> i64 {
    let rem = ts.rem_euclid(interval);
    if rem == 0 { ts } else { ts - rem + interval }
}

/// Providers may return gapped sequences; repeat the previous close into
/// each hole so the downstream stream stays exactly one interval apart.
fn gap_fill(page: &mut Vec<Candlestick>, interval: i64) {
    let mut filled = Vec::with_capacity(page.len());
    for candlestick in page.drain(..) {
        if let Some(prev) = filled.last().copied() {
            let prev: Candlestick = prev;
            let mut ts = prev.timestamp + interval;
            while ts < candlestick.timestamp {
                filled.push(Candlestick {
                    timestamp: ts,
                    open: prev.close,
                    high: prev.close,
                    low: prev.close,
                    close: prev.close,
                    volume: 0.0,
                });
                ts += interval;
            }
        }
        filled.push(candlestick);
    }
    *page = filled;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{FixedClock, MockMarketSource};
    use crate::domain::types::Provider;
    use chrono::TimeZone;
    use chrono::Utc;

    // 2021-01-02T00:00:00Z
    const T0: i64 = 1_609_545_600;

    fn btc_usdt() -> Operand {
        Operand::Coin {
            provider: Provider::Binance,
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
        }
    }

    fn candles(start: i64, closes: &[f64]) -> Vec<Candlestick> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candlestick {
                timestamp: start + i as i64 * 60,
                open: *close,
                high: close + 10.0,
                low: close - 10.0,
                close: *close,
                volume: 1.0,
            })
            .collect()
    }

    fn clock_at(ts: i64) -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.timestamp_opt(ts, 0).single().unwrap()))
    }

    fn iterator(
        source: Arc<MockMarketSource>,
        cache: Arc<TickCache>,
        now: i64,
    ) -> MarketIterator {
        MarketIterator::new(btc_usdt(), T0, false, cache, source, clock_at(now)).unwrap()
    }

    #[tokio::test]
    async fn test_next_returns_strictly_ordered_stream() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        source.stub_candlesticks(&btc_usdt(), candles(T0, &[100.0, 101.0, 102.0]));
        let mut iter = iterator(source, Arc::new(TickCache::default()), T0 + 3600);

        let mut last = None;
        for _ in 0..3 {
            let c = iter.next().await.unwrap();
            if let Some(prev) = last {
                assert_eq!(c.timestamp, prev + 60);
            }
            last = Some(c.timestamp);
        }
        // Stream exhausted afterwards.
        assert!(matches!(iter.next().await, Err(MarketError::Exhausted)));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let cache = Arc::new(TickCache::default());
        cache
            .put(
                &btc_usdt(),
                &[
                    Tick { timestamp: T0, value: 100.0 },
                    Tick { timestamp: T0 + 60, value: 200.0 },
                ],
            )
            .unwrap();
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        let mut iter = iterator(Arc::clone(&source), cache, T0 + 3600);

        let first = iter.next().await.unwrap();
        assert_eq!(first.timestamp, T0);
        assert_eq!(first.close, 100.0);
        // Cache-served candles are flat.
        assert_eq!(first.low, 100.0);
        assert_eq!(first.high, 100.0);
        let second = iter.next().await.unwrap();
        assert_eq!(second.close, 200.0);
        assert_eq!(source.candlestick_requests(), 0);
    }

    #[tokio::test]
    async fn test_provider_page_is_written_through_to_cache() {
        let cache = Arc::new(TickCache::default());
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        source.stub_candlesticks(&btc_usdt(), candles(T0, &[100.0, 101.0]));
        let mut iter = iterator(Arc::clone(&source), Arc::clone(&cache), T0 + 3600);

        iter.next().await.unwrap();
        let run = cache.get(&btc_usdt(), T0).unwrap();
        assert_eq!(run.len(), 2);
        assert_eq!(run[1].value, 101.0);
    }

    #[tokio::test]
    async fn test_not_yet_available_within_patience() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        source.stub_candlesticks(&btc_usdt(), candles(T0, &[100.0]));
        // Now is T0 + patience(60) + interval(60): T0 is exactly on the edge
        // and still considered not yet available.
        let mut iter = iterator(Arc::clone(&source), Arc::new(TickCache::default()), T0 + 120);
        assert!(matches!(iter.next().await, Err(MarketError::NoNewDataYet)));
        assert_eq!(source.candlestick_requests(), 0);

        // One second later the provider is consulted.
        let mut iter = iterator(source, Arc::new(TickCache::default()), T0 + 121);
        assert_eq!(iter.next().await.unwrap().timestamp, T0);
    }

    #[tokio::test]
    async fn test_desynced_first_page_fails_without_buffering() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        // First available candle lands one minute after the expected start.
        source.stub_candlesticks(&btc_usdt(), candles(T0 + 60, &[100.0, 101.0]));
        let cache = Arc::new(TickCache::default());
        let mut iter = iterator(source, Arc::clone(&cache), T0 + 3600);

        assert!(matches!(
            iter.next().await,
            Err(MarketError::OutOfSync { expected, actual })
                if expected == T0 && actual == T0 + 60
        ));
        // Nothing was buffered or cached from the bad page.
        assert!(cache.get(&btc_usdt(), T0 + 60).is_none());
        assert!(matches!(
            iter.next().await,
            Err(MarketError::OutOfSync { .. })
        ));
    }

    #[tokio::test]
    async fn test_earlier_than_expected_values_are_pruned() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        source.stub_candlesticks(&btc_usdt(), candles(T0 - 120, &[98.0, 99.0, 100.0, 101.0]));
        let mut iter = iterator(source, Arc::new(TickCache::default()), T0 + 3600);

        let first = iter.next().await.unwrap();
        assert_eq!(first.timestamp, T0);
        assert_eq!(first.close, 100.0);
    }

    #[tokio::test]
    async fn test_gaps_in_provider_page_are_filled() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        let mut page = candles(T0, &[100.0]);
        page.extend(candles(T0 + 180, &[103.0]));
        source.stub_candlesticks(&btc_usdt(), page);
        let mut iter = iterator(source, Arc::new(TickCache::default()), T0 + 3600);

        assert_eq!(iter.next().await.unwrap().close, 100.0);
        // The two hole minutes repeat the previous close.
        let hole = iter.next().await.unwrap();
        assert_eq!(hole.timestamp, T0 + 60);
        assert_eq!(hole.close, 100.0);
        let hole = iter.next().await.unwrap();
        assert_eq!(hole.timestamp, T0 + 120);
        assert_eq!(hole.close, 100.0);
        assert_eq!(iter.next().await.unwrap().close, 103.0);
    }

    #[tokio::test]
    async fn test_start_from_next_skips_the_seed_timestamp() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        source.stub_candlesticks(&btc_usdt(), candles(T0, &[100.0, 101.0]));
        let mut iter = MarketIterator::new(
            btc_usdt(),
            T0,
            true,
            Arc::new(TickCache::default()),
            source,
            clock_at(T0 + 3600),
        )
        .unwrap();
        assert_eq!(iter.next().await.unwrap().timestamp, T0 + 60);
    }

    #[tokio::test]
    async fn test_unread_replays_the_observation() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        source.stub_candlesticks(&btc_usdt(), candles(T0, &[100.0, 101.0]));
        let mut iter = iterator(source, Arc::new(TickCache::default()), T0 + 3600);

        let first = iter.next().await.unwrap();
        iter.unread(first);
        assert_eq!(iter.expected_ts(), T0);
        assert_eq!(iter.next().await.unwrap().timestamp, T0);
        assert_eq!(iter.next().await.unwrap().timestamp, T0 + 60);
    }

    #[tokio::test]
    async fn test_unaligned_start_rounds_up() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        source.stub_candlesticks(&btc_usdt(), candles(T0, &[100.0, 101.0]));
        let mut iter = MarketIterator::new(
            btc_usdt(),
            T0 + 1,
            false,
            Arc::new(TickCache::default()),
            source,
            clock_at(T0 + 3600),
        )
        .unwrap();
        assert_eq!(iter.next().await.unwrap().timestamp, T0 + 60);
    }

    #[tokio::test]
    async fn test_number_operand_rejected() {
        let source = Arc::new(MockMarketSource::new(Provider::Binance));
        assert!(matches!(
            MarketIterator::new(
                Operand::Number(1.0),
                T0,
                false,
                Arc::new(TickCache::default()),
                source,
                clock_at(T0),
            ),
            Err(MarketError::InvalidOperand)
        ));
    }
}
