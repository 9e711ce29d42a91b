//! Drives one prediction forward within a single evolution pass: pulls
//! observations for every active condition, feeds them through the
//! low-then-high sweep and re-derives the overall lifecycle value.

use crate::application::engine::market::Market;
use crate::application::market::MarketIterator;
use crate::domain::condition::Condition;
use crate::domain::errors::MarketError;
use crate::domain::prediction::Prediction;
use crate::domain::types::{Candlestick, Operand, Tick};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};

pub struct RunOutcome {
    /// Whether any condition or lifecycle state changed and must be persisted.
    pub dirty: bool,
    /// Per-condition failures. The rest of the prediction kept evolving.
    pub errors: Vec<anyhow::Error>,
}

/// Single-pass evolution driver for one prediction.
///
/// Iterators are created lazily and only for conditions the current phase
/// references, keyed by `(condition index, operand)`. A condition that runs
/// out of data is parked for the rest of the pass; the next pass rebuilds its
/// iterator from the persisted `last_ts`.
pub struct PredictionRunner<'a> {
    market: &'a Market,
    iterators: HashMap<(usize, String), MarketIterator>,
    stuck: HashSet<usize>,
    errors: Vec<anyhow::Error>,
    dirty: bool,
}

impl<'a> PredictionRunner<'a> {
    pub fn new(market: &'a Market) -> Self {
        Self {
            market,
            iterators: HashMap::new(),
            stuck: HashSet::new(),
            errors: Vec::new(),
            dirty: false,
        }
    }

    /// Evolve until the prediction is final or no condition can make
    /// progress with the data available right now.
    pub async fn run(mut self, prediction: &mut Prediction) -> RunOutcome {
        while !prediction.is_final() {
            let mut progressed = false;
            for index in prediction.active_condition_indexes() {
                if prediction.given[index].is_decided() || self.stuck.contains(&index) {
                    continue;
                }
                match self.step(index, &mut prediction.given[index]).await {
                    Ok(true) => progressed = true,
                    Ok(false) => {}
                    Err(err) => {
                        self.stuck.insert(index);
                        self.errors.push(err);
                    }
                }
            }
            let before = prediction.value();
            let after = prediction.evaluate();
            self.dirty |= progressed || after != before;
            // A phase transition re-activates conditions, so keep sweeping
            // whenever anything moved.
            if !progressed && after == before {
                break;
            }
        }
        RunOutcome {
            dirty: self.dirty,
            errors: self.errors,
        }
    }

    /// Pull one observation for every market operand of the condition and
    /// feed it through. Returns `true` when the condition state advanced.
    async fn step(&mut self, index: usize, condition: &mut Condition) -> Result<bool> {
        let operands: Vec<Operand> = condition.market_operands().cloned().collect();
        let resume_ts = condition.state.last_ts;
        let from_ts = condition.from_ts;
        for operand in &operands {
            let key = (index, operand.to_string());
            if !self.iterators.contains_key(&key) {
                let iterator = if resume_ts > 0 {
                    self.market.iterator(operand, resume_ts, true)
                } else {
                    self.market.iterator(operand, from_ts, false)
                }
                .with_context(|| format!("building market iterator for {operand}"))?;
                self.iterators.insert(key, iterator);
            }
        }

        let mut pulled: Vec<(String, Candlestick)> = Vec::new();
        for operand in &operands {
            let key = (index, operand.to_string());
            let iterator = self
                .iterators
                .get_mut(&key)
                .expect("iterator created above");
            match iterator.next().await {
                Ok(candlestick) => pulled.push((operand.to_string(), candlestick)),
                Err(MarketError::NoNewDataYet) => {
                    // A partial multi-operand pull must not lose observations.
                    self.unread(index, &pulled);
                    self.stuck.insert(index);
                    // Observations inside the window may still sit beyond the
                    // trust horizon; the window only closes once every
                    // in-window observation was consumed.
                    let drained = self
                        .iterators
                        .get(&(index, operand.to_string()))
                        .is_some_and(|it| it.expected_ts() >= condition.to_ts);
                    if !drained {
                        return Ok(false);
                    }
                    let now_ts = self.market.clock().now().timestamp();
                    return Ok(condition.run_window_close(now_ts));
                }
                Err(MarketError::Exhausted) => {
                    self.unread(index, &pulled);
                    self.stuck.insert(index);
                    // An empty page at a trusted timestamp is a permanent
                    // gap: nothing inside the window can arrive anymore.
                    let now_ts = self.market.clock().now().timestamp();
                    return Ok(condition.run_window_close(now_ts));
                }
                Err(err) => {
                    // Rate limits and provider failures are collected and
                    // retried on a later pass.
                    self.unread(index, &pulled);
                    self.stuck.insert(index);
                    return Err(anyhow::Error::new(err)
                        .context(format!("requesting market data for {operand}")));
                }
            }
        }

        let mut lows = HashMap::new();
        let mut highs = HashMap::new();
        for (key, candlestick) in &pulled {
            lows.insert(
                key.clone(),
                Tick {
                    timestamp: candlestick.timestamp,
                    value: candlestick.low,
                },
            );
            highs.insert(
                key.clone(),
                Tick {
                    timestamp: candlestick.timestamp,
                    value: candlestick.high,
                },
            );
        }

        // Two sweeps per period so a threshold crossed only intra-period is
        // still caught, whichever direction the comparison points.
        let feed = (|| -> std::result::Result<(), crate::domain::errors::ConditionError> {
            if !condition.run(&lows)? {
                condition.run(&highs)?;
            }
            Ok(())
        })();
        if let Err(err) = feed {
            self.unread(index, &pulled);
            self.stuck.insert(index);
            return Err(anyhow::Error::new(err)
                .context(format!("evolving condition {}", condition.name)));
        }
        Ok(true)
    }

    fn unread(&mut self, index: usize, pulled: &[(String, Candlestick)]) {
        for (key, candlestick) in pulled {
            if let Some(iterator) = self.iterators.get_mut(&(index, key.clone())) {
                iterator.unread(*candlestick);
            }
        }
    }
}
