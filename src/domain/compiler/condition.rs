//! Condition grammar: `<operand> <op> <operand>` or
//! `<operand> BETWEEN <operand> AND <operand>`.

use crate::domain::compiler::compile::RawCondition;
use crate::domain::compiler::duration::parse_duration;
use crate::domain::condition::{Condition, ConditionState};
use crate::domain::errors::ParseError;
use crate::domain::types::{Operand, Operator};
use chrono::{DateTime, Utc};

pub const MAX_ERROR_MARGIN_RATIO: f64 = 0.30;

/// Parse one operand: `COIN:<provider>:<base>-<quote>`,
/// `MARKETCAP:<provider>:<base>`, or a bare number.
pub fn parse_operand(text: &str) -> Result<Operand, ParseError> {
    let invalid = || ParseError::InvalidOperand {
        operand: text.to_string(),
    };

    let upper = text.to_uppercase();
    if let Some(rest) = upper.strip_prefix("COIN:") {
        let (provider, pair) = rest.split_once(':').ok_or_else(invalid)?;
        let provider = provider.parse()?;
        let Some((base, quote)) = pair.split_once('-') else {
            return Err(ParseError::CoinRequiresQuoteAsset {
                operand: text.to_string(),
            });
        };
        if base.is_empty() || quote.is_empty() {
            return Err(ParseError::CoinRequiresQuoteAsset {
                operand: text.to_string(),
            });
        }
        if base == quote {
            return Err(ParseError::EqualBaseAndQuoteAssets {
                operand: text.to_string(),
            });
        }
        return Ok(Operand::Coin {
            provider,
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
        });
    }

    if let Some(rest) = upper.strip_prefix("MARKETCAP:") {
        let (provider, base) = rest.split_once(':').ok_or_else(invalid)?;
        let provider = provider.parse()?;
        if base.contains('-') {
            return Err(ParseError::MarketCapForbidsQuoteAsset {
                operand: text.to_string(),
            });
        }
        if base.is_empty() {
            return Err(invalid());
        }
        return Ok(Operand::MarketCap {
            provider,
            base_asset: base.to_string(),
        });
    }

    let number: f64 = text.parse().map_err(|_| invalid())?;
    if !number.is_finite() {
        return Err(invalid());
    }
    Ok(Operand::Number(number))
}

/// Parse and validate one raw condition against its post timestamp.
///
/// `from_ts` is the explicit `fromISO8601` or `posted_at`; `to_ts` is the
/// explicit `toISO8601` or the duration grammar applied to `from_ts`.
pub fn parse_condition(
    name: &str,
    raw: &RawCondition,
    posted_at: DateTime<Utc>,
) -> Result<Condition, ParseError> {
    let (operator, operands) = parse_condition_text(&raw.condition)?;

    if raw.error_margin_ratio < 0.0 || raw.error_margin_ratio > MAX_ERROR_MARGIN_RATIO {
        return Err(ParseError::MarginOutOfRange {
            ratio: raw.error_margin_ratio,
        });
    }

    let from = match &raw.from_iso8601 {
        Some(text) => parse_timestamp(text)?,
        None => posted_at,
    };
    let (to, to_duration) = match (&raw.to_iso8601, &raw.to_duration) {
        (Some(text), _) => (parse_timestamp(text)?, None),
        (None, Some(token)) => (parse_duration(token, from)?, Some(token.clone())),
        (None, None) => return Err(ParseError::MissingEndOfWindow),
    };
    let (from_ts, to_ts) = (from.timestamp(), to.timestamp());
    if from_ts >= to_ts {
        return Err(ParseError::InvertedWindow { from_ts, to_ts });
    }

    Ok(Condition {
        name: name.to_string(),
        operator,
        operands,
        from_ts,
        to_ts,
        to_duration,
        error_margin_ratio: raw.error_margin_ratio,
        state: ConditionState::default(),
    })
}

fn parse_condition_text(text: &str) -> Result<(Operator, Vec<Operand>), ParseError> {
    let syntax = || ParseError::InvalidConditionSyntax {
        condition: text.to_string(),
    };
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let (operator, operands) = match tokens.as_slice() {
        [left, op, right] => {
            let operator: Operator = op.parse()?;
            if operator == Operator::Between {
                return Err(syntax());
            }
            (operator, vec![parse_operand(left)?, parse_operand(right)?])
        }
        [left, between, low, and, high]
            if between.eq_ignore_ascii_case("between") && and.eq_ignore_ascii_case("and") =>
        {
            (
                Operator::Between,
                vec![
                    parse_operand(left)?,
                    parse_operand(low)?,
                    parse_operand(high)?,
                ],
            )
        }
        _ => return Err(syntax()),
    };

    if !operands[0].is_market() {
        return Err(ParseError::FirstOperandNotMarket {
            condition: text.to_string(),
        });
    }
    Ok((operator, operands))
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp {
            value: text.to_string(),
        })
}
