use crate::domain::errors::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market-data providers this system knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Binance,
    Coinbase,
    KuCoin,
    Messari,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Binance => write!(f, "BINANCE"),
            Provider::Coinbase => write!(f, "COINBASE"),
            Provider::KuCoin => write!(f, "KUCOIN"),
            Provider::Messari => write!(f, "MESSARI"),
        }
    }
}

impl FromStr for Provider {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BINANCE" => Ok(Provider::Binance),
            "COINBASE" => Ok(Provider::Coinbase),
            "KUCOIN" => Ok(Provider::KuCoin),
            "MESSARI" => Ok(Provider::Messari),
            _ => Err(ParseError::UnknownProvider {
                provider: s.to_string(),
            }),
        }
    }
}

/// Comparison operator of a condition. BETWEEN takes two threshold operands,
/// everything else takes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Gt => write!(f, ">"),
            Operator::Gte => write!(f, ">="),
            Operator::Lt => write!(f, "<"),
            Operator::Lte => write!(f, "<="),
            Operator::Between => write!(f, "BETWEEN"),
        }
    }
}

impl FromStr for Operator {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            "BETWEEN" => Ok(Operator::Between),
            _ => Err(ParseError::UnknownOperator {
                operator: s.to_string(),
            }),
        }
    }
}

/// One side of a condition: a numeric literal, a market pair (minutely
/// candlesticks) or a single asset's marketcap (daily ticks).
///
/// Immutable after parse. COIN requires a quote asset, MARKETCAP forbids one,
/// and base must differ from quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Number(f64),
    Coin {
        provider: Provider,
        base_asset: String,
        quote_asset: String,
    },
    MarketCap {
        provider: Provider,
        base_asset: String,
    },
}

impl Operand {
    pub fn is_market(&self) -> bool {
        !matches!(self, Operand::Number(_))
    }

    /// Seconds between two consecutive observations for this operand, or
    /// `None` for numeric literals (which produce no observations).
    pub fn interval_secs(&self) -> Option<i64> {
        match self {
            Operand::Number(_) => None,
            Operand::Coin { .. } => Some(60),
            Operand::MarketCap { .. } => Some(86_400),
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            Operand::Number(_) => None,
            Operand::Coin { provider, .. } | Operand::MarketCap { provider, .. } => {
                Some(*provider)
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Coin {
                provider,
                base_asset,
                quote_asset,
            } => write!(f, "COIN:{}:{}-{}", provider, base_asset, quote_asset),
            Operand::MarketCap {
                provider,
                base_asset,
            } => write!(f, "MARKETCAP:{}:{}", provider, base_asset),
        }
    }
}

/// A single observed market value. A real value is never exactly zero; the
/// tick cache relies on zero meaning "unobserved".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candlestick {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candlestick {
    /// A flat candle carrying a single observed value (daily marketcap ticks
    /// and cache-served minute values surface this way).
    pub fn from_tick(tick: Tick) -> Self {
        Self {
            timestamp: tick.timestamp,
            open: tick.value,
            high: tick.value,
            low: tick.value,
            close: tick.value,
            volume: 0.0,
        }
    }
}

/// Ternary truth domain for conditions and boolean expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TruthValue {
    True,
    False,
    #[default]
    Undecided,
}

impl TruthValue {
    pub fn is_decided(&self) -> bool {
        !matches!(self, TruthValue::Undecided)
    }

    /// Ternary AND: FALSE dominates, otherwise any UNDECIDED wins.
    pub fn and(self, other: TruthValue) -> TruthValue {
        match (self, other) {
            (TruthValue::False, _) | (_, TruthValue::False) => TruthValue::False,
            (TruthValue::Undecided, _) | (_, TruthValue::Undecided) => TruthValue::Undecided,
            _ => TruthValue::True,
        }
    }

    /// Ternary OR: TRUE dominates, otherwise any UNDECIDED wins.
    pub fn or(self, other: TruthValue) -> TruthValue {
        match (self, other) {
            (TruthValue::True, _) | (_, TruthValue::True) => TruthValue::True,
            (TruthValue::Undecided, _) | (_, TruthValue::Undecided) => TruthValue::Undecided,
            _ => TruthValue::False,
        }
    }

    /// Ternary NOT: UNDECIDED passes through.
    pub fn negate(self) -> TruthValue {
        match self {
            TruthValue::True => TruthValue::False,
            TruthValue::False => TruthValue::True,
            TruthValue::Undecided => TruthValue::Undecided,
        }
    }
}

impl fmt::Display for TruthValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TruthValue::True => write!(f, "TRUE"),
            TruthValue::False => write!(f, "FALSE"),
            TruthValue::Undecided => write!(f, "UNDECIDED"),
        }
    }
}

/// Progress of a condition or prediction through its data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvolutionStatus {
    #[default]
    Unstarted,
    Started,
    Finished,
}

/// Overall lifecycle value of a prediction. The three final states are
/// terminal: a prediction carrying one is excluded from further evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictionValue {
    OngoingPrePrediction,
    OngoingPrediction,
    Correct,
    Incorrect,
    Annulled,
}

impl PredictionValue {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PredictionValue::Correct | PredictionValue::Incorrect | PredictionValue::Annulled
        )
    }
}

impl fmt::Display for PredictionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionValue::OngoingPrePrediction => write!(f, "ONGOING_PRE_PREDICTION"),
            PredictionValue::OngoingPrediction => write!(f, "ONGOING_PREDICTION"),
            PredictionValue::Correct => write!(f, "CORRECT"),
            PredictionValue::Incorrect => write!(f, "INCORRECT"),
            PredictionValue::Annulled => write!(f, "ANNULLED"),
        }
    }
}

/// Announcement side-actions, keyed together with the post URL for
/// idempotency in the interaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    PredictionCreated,
    BecameFinal,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::PredictionCreated => write!(f, "PREDICTION_CREATED"),
            ActionType::BecameFinal => write!(f, "BECAME_FINAL"),
        }
    }
}
