use crate::domain::errors::ConditionError;
use crate::domain::types::{EvolutionStatus, Operand, Operator, Tick, TruthValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mutable evolution state of a condition. Everything else on a condition is
/// immutable after compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionState {
    pub status: EvolutionStatus,
    /// Timestamp of the last observation fed into the condition. Persisted so
    /// a later pass resumes from here instead of replaying the whole window.
    pub last_ts: i64,
    /// Last tick seen per market operand, keyed by the operand's text form.
    pub last_ticks: HashMap<String, Tick>,
    pub value: TruthValue,
}

/// One atomic, time-bounded, margin-tolerant comparison against market data.
///
/// Valid over `[from_ts, to_ts)`. The truth value is terminal: once TRUE or
/// FALSE the condition stops requesting data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub operator: Operator,
    /// Two operands, or three for BETWEEN (value, low bound, high bound).
    pub operands: Vec<Operand>,
    pub from_ts: i64,
    pub to_ts: i64,
    /// The original duration token (`3m`, `eoy`, ...) when the window end was
    /// given as a duration. Kept so serialization reproduces the input.
    pub to_duration: Option<String>,
    /// Tolerance ratio in [0, 0.30] loosening the threshold band.
    pub error_margin_ratio: f64,
    pub state: ConditionState,
}

impl Condition {
    pub fn is_decided(&self) -> bool {
        self.state.value.is_decided()
    }

    pub fn market_operands(&self) -> impl Iterator<Item = &Operand> {
        self.operands.iter().filter(|o| o.is_market())
    }

    /// Feed one observation (one tick per market operand, all sharing a
    /// timestamp) into the condition. Returns `true` when this call decided
    /// the condition. A decided condition ignores further input.
    ///
    /// The evolution loop calls this twice per observed period, once with the
    /// period's low values and once with its highs, so a threshold crossed
    /// only momentarily within the period is still detected.
    pub fn run(&mut self, ticks: &HashMap<String, Tick>) -> Result<bool, ConditionError> {
        if self.is_decided() {
            return Ok(false);
        }

        let mut timestamp: Option<i64> = None;
        for operand in self.market_operands() {
            let key = operand.to_string();
            let tick = ticks
                .get(&key)
                .ok_or(ConditionError::MissingTick { operand: key })?;
            match timestamp {
                None => timestamp = Some(tick.timestamp),
                Some(ts) if ts != tick.timestamp => {
                    return Err(ConditionError::MismatchedTimestamps);
                }
                Some(_) => {}
            }
        }
        let timestamp = timestamp.ok_or(ConditionError::NoMarketOperand)?;

        // Equal timestamps are fine: the low and high sweeps share a period.
        if timestamp < self.state.last_ts {
            return Err(ConditionError::NonIncreasingTimestamp {
                timestamp,
                last_ts: self.state.last_ts,
            });
        }
        if timestamp < self.from_ts {
            return Ok(false);
        }

        self.state.status = EvolutionStatus::Started;
        self.state.last_ts = timestamp;
        for operand in self.operands.iter().filter(|o| o.is_market()) {
            let key = operand.to_string();
            if let Some(tick) = ticks.get(&key) {
                self.state.last_ticks.insert(key, *tick);
            }
        }

        // An observation at or past the window end closes it; the value never
        // happened in time.
        if timestamp >= self.to_ts {
            self.finish(TruthValue::False);
            return Ok(true);
        }

        if let Some(decided) = self.evaluate(ticks)? {
            self.finish(decided);
            return Ok(true);
        }
        Ok(false)
    }

    /// Close the validity window by wall clock. Used when an operand's data
    /// stream is exhausted and `now` already passed `to_ts`, so no observation
    /// inside the window can still arrive. Returns `true` on a transition.
    pub fn run_window_close(&mut self, now_ts: i64) -> bool {
        if self.is_decided() || now_ts < self.to_ts {
            return false;
        }
        self.finish(TruthValue::False);
        true
    }

    fn finish(&mut self, value: TruthValue) {
        self.state.value = value;
        self.state.status = EvolutionStatus::Finished;
    }

    fn operand_value(
        &self,
        index: usize,
        ticks: &HashMap<String, Tick>,
    ) -> Result<f64, ConditionError> {
        match &self.operands[index] {
            Operand::Number(n) => Ok(*n),
            operand => {
                let key = operand.to_string();
                ticks
                    .get(&key)
                    .map(|t| t.value)
                    .ok_or(ConditionError::MissingTick { operand: key })
            }
        }
    }

    /// Margin semantics: the error-margin ratio loosens the threshold toward
    /// TRUE (`<= t` becomes `<= t*(1+m)`, `>= t` becomes `>= t*(1-m)`).
    /// Comparisons that do not (yet) hold stay UNDECIDED until the window
    /// closes; BETWEEN decides every observation, inclusively.
    fn evaluate(&self, ticks: &HashMap<String, Tick>) -> Result<Option<TruthValue>, ConditionError> {
        let value = self.operand_value(0, ticks)?;
        let margin = self.error_margin_ratio;

        let decided = match self.operator {
            Operator::Gt => {
                let threshold = self.operand_value(1, ticks)?;
                (value > threshold * (1.0 - margin)).then_some(TruthValue::True)
            }
            Operator::Gte => {
                let threshold = self.operand_value(1, ticks)?;
                (value >= threshold * (1.0 - margin)).then_some(TruthValue::True)
            }
            Operator::Lt => {
                let threshold = self.operand_value(1, ticks)?;
                (value < threshold * (1.0 + margin)).then_some(TruthValue::True)
            }
            Operator::Lte => {
                let threshold = self.operand_value(1, ticks)?;
                (value <= threshold * (1.0 + margin)).then_some(TruthValue::True)
            }
            Operator::Between => {
                let low = self.operand_value(1, ticks)?;
                let high = self.operand_value(2, ticks)?;
                if value >= low * (1.0 - margin) && value <= high * (1.0 + margin) {
                    Some(TruthValue::True)
                } else {
                    Some(TruthValue::False)
                }
            }
        };
        Ok(decided)
    }
}
