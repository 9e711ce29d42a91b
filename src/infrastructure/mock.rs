//! Scriptable market source and fixed clock used across unit and
//! integration tests.

use crate::domain::errors::MarketError;
use crate::domain::ports::{Clock, MarketSource};
use crate::domain::types::{Candlestick, Operand, Provider, Tick};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory [`MarketSource`] with per-operand scripted data and an error
/// queue for injecting provider failures.
pub struct MockMarketSource {
    provider: Provider,
    patience: Duration,
    candlesticks: Mutex<HashMap<String, Vec<Candlestick>>>,
    ticks: Mutex<HashMap<String, Vec<Tick>>>,
    failures: Mutex<Vec<MarketError>>,
    candlestick_requests: Mutex<usize>,
    tick_requests: Mutex<usize>,
}

impl MockMarketSource {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            patience: Duration::minutes(1),
            candlesticks: Mutex::new(HashMap::new()),
            ticks: Mutex::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
            candlestick_requests: Mutex::new(0),
            tick_requests: Mutex::new(0),
        }
    }

    pub fn with_patience(mut self, patience: Duration) -> Self {
        self.patience = patience;
        self
    }

    pub fn stub_candlesticks(&self, operand: &Operand, candlesticks: Vec<Candlestick>) {
        self.candlesticks
            .lock()
            .unwrap()
            .insert(operand.to_string(), candlesticks);
    }

    pub fn stub_ticks(&self, operand: &Operand, ticks: Vec<Tick>) {
        self.ticks.lock().unwrap().insert(operand.to_string(), ticks);
    }

    /// Queue an error; the next request pops and returns it instead of data.
    pub fn fail_next(&self, error: MarketError) {
        self.failures.lock().unwrap().push(error);
    }

    pub fn candlestick_requests(&self) -> usize {
        *self.candlestick_requests.lock().unwrap()
    }

    pub fn tick_requests(&self) -> usize {
        *self.tick_requests.lock().unwrap()
    }

    fn pop_failure(&self) -> Option<MarketError> {
        let mut failures = self.failures.lock().unwrap();
        if failures.is_empty() {
            None
        } else {
            Some(failures.remove(0))
        }
    }
}

#[async_trait]
impl MarketSource for MockMarketSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn patience(&self) -> Duration {
        self.patience
    }

    async fn request_ticks(
        &self,
        operand: &Operand,
        start_time_ts: i64,
    ) -> Result<Vec<Tick>, MarketError> {
        *self.tick_requests.lock().unwrap() += 1;
        if let Some(error) = self.pop_failure() {
            return Err(error);
        }
        let ticks = self.ticks.lock().unwrap();
        Ok(ticks
            .get(&operand.to_string())
            .map(|all| {
                all.iter()
                    .filter(|t| t.timestamp >= start_time_ts)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn request_candlesticks(
        &self,
        operand: &Operand,
        start_time_ts: i64,
        _interval_minutes: u32,
    ) -> Result<Vec<Candlestick>, MarketError> {
        *self.candlestick_requests.lock().unwrap() += 1;
        if let Some(error) = self.pop_failure() {
            return Err(error);
        }
        let candlesticks = self.candlesticks.lock().unwrap();
        Ok(candlesticks
            .get(&operand.to_string())
            .map(|all| {
                all.iter()
                    .filter(|c| c.timestamp >= start_time_ts)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
