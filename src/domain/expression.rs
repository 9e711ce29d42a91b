use crate::domain::condition::Condition;
use crate::domain::types::TruthValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Boolean-logic tree over conditions, evaluated in the ternary domain.
///
/// Literals index into the owning prediction's condition vector rather than
/// holding a reference, so the tree stays plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoolExpr {
    Literal(usize),
    Not(Box<BoolExpr>),
    And(Vec<BoolExpr>),
    Or(Vec<BoolExpr>),
}

impl BoolExpr {
    /// Ternary evaluation. AND/OR resolve as soon as one child forces the
    /// outcome (a FALSE child for AND, a TRUE child for OR), otherwise any
    /// UNDECIDED child keeps the result UNDECIDED.
    pub fn evaluate(&self, conditions: &[Condition]) -> TruthValue {
        match self {
            BoolExpr::Literal(index) => conditions
                .get(*index)
                .map(|c| c.state.value)
                .unwrap_or(TruthValue::Undecided),
            BoolExpr::Not(inner) => inner.evaluate(conditions).negate(),
            BoolExpr::And(children) => {
                let mut result = TruthValue::True;
                for child in children {
                    result = result.and(child.evaluate(conditions));
                    if result == TruthValue::False {
                        return TruthValue::False;
                    }
                }
                result
            }
            BoolExpr::Or(children) => {
                let mut result = TruthValue::False;
                for child in children {
                    result = result.or(child.evaluate(conditions));
                    if result == TruthValue::True {
                        return TruthValue::True;
                    }
                }
                result
            }
        }
    }

    /// Collect the condition indexes this expression references.
    pub fn condition_indexes(&self, out: &mut BTreeSet<usize>) {
        match self {
            BoolExpr::Literal(index) => {
                out.insert(*index);
            }
            BoolExpr::Not(inner) => inner.condition_indexes(out),
            BoolExpr::And(children) | BoolExpr::Or(children) => {
                for child in children {
                    child.condition_indexes(out);
                }
            }
        }
    }
}
