//! Text renderers sharing the compiler's grammar. Re-serializing a compiled
//! tree reproduces the input text, with minimal parenthesization below the
//! top nesting level.

use crate::domain::condition::Condition;
use crate::domain::expression::BoolExpr;
use crate::domain::types::{Operand, Operator};

pub fn serialize_operand(operand: &Operand) -> String {
    operand.to_string()
}

pub fn serialize_condition(condition: &Condition) -> String {
    match condition.operator {
        Operator::Between => format!(
            "{} BETWEEN {} AND {}",
            condition.operands[0], condition.operands[1], condition.operands[2]
        ),
        op => format!(
            "{} {} {}",
            condition.operands[0], op, condition.operands[1]
        ),
    }
}

/// The original duration token when the window end was given as one.
pub fn serialize_duration(condition: &Condition) -> Option<&str> {
    condition.to_duration.as_deref()
}

pub fn serialize_bool_expr(expr: &BoolExpr, conditions: &[Condition]) -> String {
    render(expr, conditions, true)
}

fn render(expr: &BoolExpr, conditions: &[Condition], top_level: bool) -> String {
    match expr {
        BoolExpr::Literal(index) => conditions
            .get(*index)
            .map(|c| c.name.clone())
            .unwrap_or_default(),
        BoolExpr::Not(inner) => format!("not {}", render(inner, conditions, false)),
        BoolExpr::And(children) => {
            let joined = children
                .iter()
                .map(|c| render(c, conditions, false))
                .collect::<Vec<_>>()
                .join(" and ");
            if top_level {
                joined
            } else {
                format!("({})", joined)
            }
        }
        BoolExpr::Or(children) => {
            let joined = children
                .iter()
                .map(|c| render(c, conditions, false))
                .collect::<Vec<_>>()
                .join(" or ");
            if top_level {
                joined
            } else {
                format!("({})", joined)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::compiler::compile::RawCondition;
    use crate::domain::compiler::condition::parse_condition;
    use crate::domain::compiler::expression::parse_bool_expr;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;

    fn posted() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2021-01-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn compile(name: &str, text: &str) -> Condition {
        parse_condition(
            name,
            &RawCondition {
                condition: text.to_string(),
                from_iso8601: None,
                to_iso8601: None,
                to_duration: Some("eoy".to_string()),
                error_margin_ratio: 0.0,
            },
            posted(),
        )
        .unwrap()
    }

    #[test]
    fn test_condition_round_trip() {
        for text in [
            "COIN:BINANCE:BTC-USDT <= 30000",
            "COIN:COINBASE:ETH-USD > 2000",
            "COIN:BINANCE:BTC-USDT BETWEEN 60000 AND 70000",
            "MARKETCAP:MESSARI:ETH >= MARKETCAP:MESSARI:BTC",
        ] {
            let cond = compile("main", text);
            assert_eq!(serialize_condition(&cond), text);
            assert_eq!(serialize_duration(&cond), Some("eoy"));
        }
    }

    #[test]
    fn test_bool_expr_round_trip() {
        let conditions: Vec<Condition> = ["a", "b", "c"]
            .iter()
            .map(|n| compile(n, "COIN:BINANCE:BTC-USDT <= 30000"))
            .collect();
        let defs: HashMap<String, usize> = conditions
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        for text in [
            "a",
            "not a",
            "a and b and c",
            "a or b",
            "a and (b or c)",
            "not (a and b)",
            "(a or b) and not c",
        ] {
            let expr = parse_bool_expr(text, &defs).unwrap();
            assert_eq!(serialize_bool_expr(&expr, &conditions), text);
        }
    }
}
