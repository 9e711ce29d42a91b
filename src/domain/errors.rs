use thiserror::Error;

/// Errors produced while parsing condition or boolean-expression text.
/// These always fail the whole compile and are surfaced verbatim.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("unknown operator: {operator}")]
    UnknownOperator { operator: String },

    #[error("invalid operand: {operand}")]
    InvalidOperand { operand: String },

    #[error("COIN operand requires a quote asset: {operand}")]
    CoinRequiresQuoteAsset { operand: String },

    #[error("MARKETCAP operand must not have a quote asset: {operand}")]
    MarketCapForbidsQuoteAsset { operand: String },

    #[error("base and quote assets must differ: {operand}")]
    EqualBaseAndQuoteAssets { operand: String },

    #[error("condition must compare a market operand: {condition}")]
    FirstOperandNotMarket { condition: String },

    #[error("invalid condition syntax: {condition}")]
    InvalidConditionSyntax { condition: String },

    #[error("error margin ratio {ratio} outside [0, 0.30]")]
    MarginOutOfRange { ratio: f64 },

    #[error("invalid duration: {duration}")]
    InvalidDuration { duration: String },

    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    #[error("condition has no end: either toISO8601 or toDuration is required")]
    MissingEndOfWindow,

    #[error("condition window is empty or inverted: from {from_ts} to {to_ts}")]
    InvertedWindow { from_ts: i64, to_ts: i64 },

    #[error("unknown condition identifier: {identifier}")]
    UnknownIdentifier { identifier: String },

    #[error("and/or operators cannot be mixed without parentheses")]
    MixedAndOr,

    #[error("unbalanced parentheses in expression")]
    UnbalancedParentheses,

    #[error("not requires exactly one operand")]
    InvalidNotArity,

    #[error("unexpected trailing tokens after expression: {rest}")]
    TrailingTokens { rest: String },

    #[error("empty boolean expression")]
    EmptyExpression,
}

/// Errors from `Compile`. Bad grammar, missing fields and oversized margins
/// are non-recoverable: the whole input is rejected.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid prediction JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("required field missing: {field}")]
    MissingField { field: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("prePredict.wrongIf/annulledIf require prePredict.predict")]
    PrePredictWithoutPredict,
}

/// Failures of a tick-cache `put`. Any of these leaves the cache unchanged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("cannot cache an empty batch of ticks")]
    EmptyInput,

    #[error("tick at {timestamp} has value zero, which marks an unobserved slot")]
    ZeroValue { timestamp: i64 },

    #[error("non-contiguous tick timestamps: expected {expected}, got {actual}")]
    NonContiguousTimestamp { expected: i64, actual: i64 },

    #[error("tick timestamp {timestamp} is not aligned to a {interval_secs}s boundary")]
    MisalignedTimestamp { timestamp: i64, interval_secs: i64 },

    #[error("only market operands can be cached")]
    UnsupportedOperand,
}

/// Errors on the market-data supply path.
///
/// `NoNewDataYet` and `Exhausted` are soft signals: the caller defers the
/// operand to a later pass instead of retrying in-loop. `RateLimited` and
/// provider failures surface as pass errors and are retried on a later pass.
/// `UnknownMarketPair` is effectively permanent for the condition that hit it.
#[derive(Debug, Clone, Error)]
pub enum MarketError {
    #[error("unknown market pair")]
    UnknownMarketPair,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("no new data available yet for this timestamp")]
    NoNewDataYet,

    #[error("market data exhausted")]
    Exhausted,

    #[error("out of sync with provider: expected timestamp {expected}, got {actual}")]
    OutOfSync { expected: i64, actual: i64 },

    #[error("operand does not reference a market")]
    InvalidOperand,

    #[error("no market source configured for provider {provider}")]
    UnsupportedProvider { provider: String },

    #[error("provider request failed: {0}")]
    Provider(String),
}

/// Errors while feeding observed values into a condition.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    #[error("missing tick for operand {operand}")]
    MissingTick { operand: String },

    #[error("operand ticks carry mismatched timestamps")]
    MismatchedTimestamps,

    #[error("tick timestamp {timestamp} precedes last seen {last_ts}")]
    NonIncreasingTimestamp { timestamp: i64, last_ts: i64 },

    #[error("condition has no market operand to observe")]
    NoMarketOperand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_formatting() {
        let err = ParseError::MarginOutOfRange { ratio: 0.5 };
        assert!(err.to_string().contains("0.5"));

        let err = ParseError::UnknownIdentifier {
            identifier: "b".to_string(),
        };
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_cache_error_formatting() {
        let err = CacheError::NonContiguousTimestamp {
            expected: 120,
            actual: 300,
        };
        let msg = err.to_string();
        assert!(msg.contains("120"));
        assert!(msg.contains("300"));
    }

    #[test]
    fn test_market_error_out_of_sync_formatting() {
        let err = MarketError::OutOfSync {
            expected: 60,
            actual: 180,
        };
        let msg = err.to_string();
        assert!(msg.contains("60"));
        assert!(msg.contains("180"));
    }
}
