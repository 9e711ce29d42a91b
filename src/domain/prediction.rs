use crate::domain::condition::Condition;
use crate::domain::expression::BoolExpr;
use crate::domain::types::{EvolutionStatus, Operand, Operator, PredictionValue, TruthValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Optional pre-phase of a prediction. `wrong_if`/`annulled_if` require
/// `predict` (enforced at compile time).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrePredict {
    pub wrong_if: Option<BoolExpr>,
    pub annulled_if: Option<BoolExpr>,
    pub predict: Option<BoolExpr>,
    pub annulled_if_predict_is_false: bool,
    pub ignore_undecided_if_predict_is_defined: bool,
}

impl PrePredict {
    pub fn has_expressions(&self) -> bool {
        self.wrong_if.is_some() || self.annulled_if.is_some() || self.predict.is_some()
    }
}

/// Main phase of a prediction. `predict` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predict {
    pub wrong_if: Option<BoolExpr>,
    pub annulled_if: Option<BoolExpr>,
    pub predict: BoolExpr,
    pub annulled_if_predict_is_false: bool,
    pub ignore_undecided_if_predict_is_defined: bool,
}

/// Cosmetic structural classification, used only for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionType {
    CoinOperatorFloatDeadline,
    CoinWillRange,
    TheFlippening,
    Unsupported,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionState {
    pub status: EvolutionStatus,
    pub last_ts: i64,
    pub value: Option<PredictionValue>,
}

/// Aggregate root for one tracked claim: all conditions owned by value plus
/// the boolean structure deciding the overall lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Assigned by the store on first upsert.
    pub uuid: Option<Uuid>,
    pub reporter: String,
    pub post_url: String,
    pub post_author: String,
    pub posted_at: i64,
    /// Owned, ordered condition collection. BoolExpr literals index into it.
    pub given: Vec<Condition>,
    pub pre_predict: Option<PrePredict>,
    pub predict: Predict,
    pub prediction_type: PredictionType,
    pub state: PredictionState,
    pub paused: bool,
    pub hidden: bool,
    pub deleted: bool,
}

/// Outcome of evaluating one phase's expression triple.
enum PhaseOutcome {
    Annulled,
    Incorrect,
    PredictTrue,
    PredictFalse,
    Ongoing,
}

fn evaluate_phase(
    wrong_if: Option<&BoolExpr>,
    annulled_if: Option<&BoolExpr>,
    predict: Option<&BoolExpr>,
    ignore_undecided_if_predict_is_defined: bool,
    conditions: &[Condition],
) -> PhaseOutcome {
    let wrong = wrong_if
        .map(|e| e.evaluate(conditions))
        .unwrap_or(TruthValue::False);
    let annulled = annulled_if
        .map(|e| e.evaluate(conditions))
        .unwrap_or(TruthValue::False);
    let predicted = predict
        .map(|e| e.evaluate(conditions))
        .unwrap_or(TruthValue::True);

    if annulled == TruthValue::True {
        return PhaseOutcome::Annulled;
    }
    if wrong == TruthValue::True {
        return PhaseOutcome::Incorrect;
    }

    // An undecided override normally blocks the phase from resolving, since
    // it could still flip to TRUE and take precedence.
    let override_undecided =
        wrong == TruthValue::Undecided || annulled == TruthValue::Undecided;
    let ignorable =
        ignore_undecided_if_predict_is_defined && predict.is_some() && predicted.is_decided();
    if override_undecided && !ignorable {
        return PhaseOutcome::Ongoing;
    }

    match predicted {
        TruthValue::True => PhaseOutcome::PredictTrue,
        TruthValue::False => PhaseOutcome::PredictFalse,
        TruthValue::Undecided => PhaseOutcome::Ongoing,
    }
}

impl Prediction {
    /// Initial lifecycle value for a freshly compiled prediction.
    pub fn initial_value(&self) -> PredictionValue {
        match &self.pre_predict {
            Some(pre) if pre.has_expressions() => PredictionValue::OngoingPrePrediction,
            _ => PredictionValue::OngoingPrediction,
        }
    }

    pub fn value(&self) -> PredictionValue {
        self.state.value.unwrap_or_else(|| self.initial_value())
    }

    pub fn is_final(&self) -> bool {
        self.value().is_final()
    }

    /// Re-derive the overall lifecycle value from the current condition
    /// states. Terminal values are sticky.
    ///
    /// The pre-phase is decided first: its `wrongIf`/`annulledIf` override a
    /// TRUE prediction, and its `predict` gates entry into the main phase.
    pub fn evaluate(&mut self) -> PredictionValue {
        let current = self.value();
        if current.is_final() {
            return current;
        }

        let value = self.evaluate_value(current);
        self.state.value = Some(value);
        self.state.status = if value.is_final() {
            EvolutionStatus::Finished
        } else {
            EvolutionStatus::Started
        };
        self.state.last_ts = self
            .given
            .iter()
            .map(|c| c.state.last_ts)
            .max()
            .unwrap_or(self.state.last_ts);
        value
    }

    fn evaluate_value(&self, current: PredictionValue) -> PredictionValue {
        if current == PredictionValue::OngoingPrePrediction {
            let pre = match &self.pre_predict {
                Some(pre) if pre.has_expressions() => pre,
                _ => return self.evaluate_predict_phase(),
            };
            match evaluate_phase(
                pre.wrong_if.as_ref(),
                pre.annulled_if.as_ref(),
                pre.predict.as_ref(),
                pre.ignore_undecided_if_predict_is_defined,
                &self.given,
            ) {
                PhaseOutcome::Annulled => PredictionValue::Annulled,
                PhaseOutcome::Incorrect => PredictionValue::Incorrect,
                PhaseOutcome::PredictFalse => {
                    if pre.annulled_if_predict_is_false {
                        PredictionValue::Annulled
                    } else {
                        PredictionValue::OngoingPrePrediction
                    }
                }
                PhaseOutcome::Ongoing => PredictionValue::OngoingPrePrediction,
                PhaseOutcome::PredictTrue => self.evaluate_predict_phase(),
            }
        } else {
            self.evaluate_predict_phase()
        }
    }

    fn evaluate_predict_phase(&self) -> PredictionValue {
        match evaluate_phase(
            self.predict.wrong_if.as_ref(),
            self.predict.annulled_if.as_ref(),
            Some(&self.predict.predict),
            self.predict.ignore_undecided_if_predict_is_defined,
            &self.given,
        ) {
            PhaseOutcome::Annulled => PredictionValue::Annulled,
            PhaseOutcome::Incorrect => PredictionValue::Incorrect,
            PhaseOutcome::PredictTrue => PredictionValue::Correct,
            PhaseOutcome::PredictFalse => {
                if self.predict.annulled_if_predict_is_false {
                    PredictionValue::Annulled
                } else {
                    PredictionValue::Incorrect
                }
            }
            PhaseOutcome::Ongoing => PredictionValue::OngoingPrediction,
        }
    }

    /// Conditions referenced by the phase the prediction is currently in.
    /// While the pre-phase is undecided, no main-phase iterators may exist.
    pub fn active_condition_indexes(&self) -> BTreeSet<usize> {
        let mut indexes = BTreeSet::new();
        match self.value() {
            PredictionValue::OngoingPrePrediction => {
                if let Some(pre) = &self.pre_predict {
                    for expr in [&pre.wrong_if, &pre.annulled_if, &pre.predict]
                        .into_iter()
                        .flatten()
                    {
                        expr.condition_indexes(&mut indexes);
                    }
                }
            }
            PredictionValue::OngoingPrediction => {
                for expr in [
                    self.predict.wrong_if.as_ref(),
                    self.predict.annulled_if.as_ref(),
                    Some(&self.predict.predict),
                ]
                .into_iter()
                .flatten()
                {
                    expr.condition_indexes(&mut indexes);
                }
            }
            _ => {}
        }
        indexes
    }

    /// Structural classifier. Only ever consulted for human summaries.
    pub fn classify(&self) -> PredictionType {
        if self.pre_predict.is_some()
            || self.predict.wrong_if.is_some()
            || self.predict.annulled_if.is_some()
        {
            return PredictionType::Unsupported;
        }
        let BoolExpr::Literal(index) = self.predict.predict else {
            return PredictionType::Unsupported;
        };
        let Some(condition) = self.given.get(index) else {
            return PredictionType::Unsupported;
        };
        match (&condition.operator, condition.operands.as_slice()) {
            (Operator::Between, [Operand::Coin { .. }, _, _]) => PredictionType::CoinWillRange,
            (_, [Operand::Coin { .. }, Operand::Number(_)]) => {
                PredictionType::CoinOperatorFloatDeadline
            }
            (_, [Operand::MarketCap { .. }, Operand::MarketCap { .. }]) => {
                PredictionType::TheFlippening
            }
            _ => PredictionType::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::ConditionState;
    use crate::domain::types::Provider;

    fn coin_condition(name: &str, value: TruthValue) -> Condition {
        Condition {
            name: name.to_string(),
            operator: Operator::Lte,
            operands: vec![
                Operand::Coin {
                    provider: Provider::Binance,
                    base_asset: "BTC".to_string(),
                    quote_asset: "USDT".to_string(),
                },
                Operand::Number(30000.0),
            ],
            from_ts: 0,
            to_ts: 100,
            to_duration: None,
            error_margin_ratio: 0.0,
            state: ConditionState {
                value,
                ..ConditionState::default()
            },
        }
    }

    fn prediction(
        given: Vec<Condition>,
        pre_predict: Option<PrePredict>,
        predict: Predict,
    ) -> Prediction {
        Prediction {
            uuid: None,
            reporter: "admin".to_string(),
            post_url: "https://example.com/post/1".to_string(),
            post_author: "someone".to_string(),
            posted_at: 0,
            given,
            pre_predict,
            predict,
            prediction_type: PredictionType::Unsupported,
            state: PredictionState::default(),
            paused: false,
            hidden: false,
            deleted: false,
        }
    }

    fn plain_predict(expr: BoolExpr) -> Predict {
        Predict {
            wrong_if: None,
            annulled_if: None,
            predict: expr,
            annulled_if_predict_is_false: false,
            ignore_undecided_if_predict_is_defined: false,
        }
    }

    #[test]
    fn test_predict_true_is_correct() {
        let mut p = prediction(
            vec![coin_condition("a", TruthValue::True)],
            None,
            plain_predict(BoolExpr::Literal(0)),
        );
        assert_eq!(p.evaluate(), PredictionValue::Correct);
        assert!(p.is_final());
    }

    #[test]
    fn test_predict_false_is_incorrect_or_annulled_by_flag() {
        let mut p = prediction(
            vec![coin_condition("a", TruthValue::False)],
            None,
            plain_predict(BoolExpr::Literal(0)),
        );
        assert_eq!(p.evaluate(), PredictionValue::Incorrect);

        let mut p = prediction(
            vec![coin_condition("a", TruthValue::False)],
            None,
            Predict {
                annulled_if_predict_is_false: true,
                ..plain_predict(BoolExpr::Literal(0))
            },
        );
        assert_eq!(p.evaluate(), PredictionValue::Annulled);
    }

    #[test]
    fn test_undecided_predict_stays_ongoing() {
        let mut p = prediction(
            vec![coin_condition("a", TruthValue::Undecided)],
            None,
            plain_predict(BoolExpr::Literal(0)),
        );
        assert_eq!(p.evaluate(), PredictionValue::OngoingPrediction);
        assert!(!p.is_final());
    }

    #[test]
    fn test_wrong_if_overrides_predict() {
        let mut p = prediction(
            vec![
                coin_condition("a", TruthValue::True),
                coin_condition("b", TruthValue::True),
            ],
            None,
            Predict {
                wrong_if: Some(BoolExpr::Literal(1)),
                ..plain_predict(BoolExpr::Literal(0))
            },
        );
        assert_eq!(p.evaluate(), PredictionValue::Incorrect);
    }

    #[test]
    fn test_annulled_if_takes_precedence_over_wrong_if() {
        let mut p = prediction(
            vec![
                coin_condition("a", TruthValue::True),
                coin_condition("b", TruthValue::True),
            ],
            None,
            Predict {
                wrong_if: Some(BoolExpr::Literal(1)),
                annulled_if: Some(BoolExpr::Literal(1)),
                ..plain_predict(BoolExpr::Literal(0))
            },
        );
        assert_eq!(p.evaluate(), PredictionValue::Annulled);
    }

    #[test]
    fn test_undecided_wrong_if_blocks_decision_unless_ignored() {
        let given = vec![
            coin_condition("a", TruthValue::True),
            coin_condition("b", TruthValue::Undecided),
        ];
        let mut p = prediction(
            given.clone(),
            None,
            Predict {
                wrong_if: Some(BoolExpr::Literal(1)),
                ..plain_predict(BoolExpr::Literal(0))
            },
        );
        assert_eq!(p.evaluate(), PredictionValue::OngoingPrediction);

        let mut p = prediction(
            given,
            None,
            Predict {
                wrong_if: Some(BoolExpr::Literal(1)),
                ignore_undecided_if_predict_is_defined: true,
                ..plain_predict(BoolExpr::Literal(0))
            },
        );
        assert_eq!(p.evaluate(), PredictionValue::Correct);
    }

    #[test]
    fn test_pre_predict_wrong_if_true_is_immediately_incorrect() {
        let mut p = prediction(
            vec![
                coin_condition("pre", TruthValue::Undecided),
                coin_condition("bad", TruthValue::True),
                coin_condition("main", TruthValue::Undecided),
            ],
            Some(PrePredict {
                wrong_if: Some(BoolExpr::Literal(1)),
                annulled_if: None,
                predict: Some(BoolExpr::Literal(0)),
                annulled_if_predict_is_false: false,
                ignore_undecided_if_predict_is_defined: false,
            }),
            plain_predict(BoolExpr::Literal(2)),
        );
        assert_eq!(p.initial_value(), PredictionValue::OngoingPrePrediction);
        assert_eq!(p.evaluate(), PredictionValue::Incorrect);
    }

    #[test]
    fn test_pre_predict_gate_advances_to_main_phase() {
        let mut p = prediction(
            vec![
                coin_condition("pre", TruthValue::True),
                coin_condition("main", TruthValue::Undecided),
            ],
            Some(PrePredict {
                wrong_if: None,
                annulled_if: None,
                predict: Some(BoolExpr::Literal(0)),
                annulled_if_predict_is_false: false,
                ignore_undecided_if_predict_is_defined: false,
            }),
            plain_predict(BoolExpr::Literal(1)),
        );
        assert_eq!(p.evaluate(), PredictionValue::OngoingPrediction);
        // Only main-phase conditions remain active.
        assert_eq!(
            p.active_condition_indexes().into_iter().collect::<Vec<_>>(),
            vec![1]
        );
    }

    #[test]
    fn test_pre_predict_false_without_flag_stays_in_pre_phase() {
        let mut p = prediction(
            vec![
                coin_condition("pre", TruthValue::False),
                coin_condition("main", TruthValue::Undecided),
            ],
            Some(PrePredict {
                wrong_if: None,
                annulled_if: None,
                predict: Some(BoolExpr::Literal(0)),
                annulled_if_predict_is_false: false,
                ignore_undecided_if_predict_is_defined: false,
            }),
            plain_predict(BoolExpr::Literal(1)),
        );
        assert_eq!(p.evaluate(), PredictionValue::OngoingPrePrediction);
    }

    #[test]
    fn test_pre_predict_false_with_flag_annuls() {
        let mut p = prediction(
            vec![
                coin_condition("pre", TruthValue::False),
                coin_condition("main", TruthValue::Undecided),
            ],
            Some(PrePredict {
                wrong_if: None,
                annulled_if: None,
                predict: Some(BoolExpr::Literal(0)),
                annulled_if_predict_is_false: true,
                ignore_undecided_if_predict_is_defined: false,
            }),
            plain_predict(BoolExpr::Literal(1)),
        );
        assert_eq!(p.evaluate(), PredictionValue::Annulled);
    }

    #[test]
    fn test_pre_phase_only_activates_pre_conditions() {
        let p = prediction(
            vec![
                coin_condition("pre", TruthValue::Undecided),
                coin_condition("main", TruthValue::Undecided),
            ],
            Some(PrePredict {
                wrong_if: None,
                annulled_if: None,
                predict: Some(BoolExpr::Literal(0)),
                annulled_if_predict_is_false: false,
                ignore_undecided_if_predict_is_defined: false,
            }),
            plain_predict(BoolExpr::Literal(1)),
        );
        assert_eq!(
            p.active_condition_indexes().into_iter().collect::<Vec<_>>(),
            vec![0]
        );
    }

    #[test]
    fn test_terminal_value_is_sticky() {
        let mut p = prediction(
            vec![coin_condition("a", TruthValue::True)],
            None,
            plain_predict(BoolExpr::Literal(0)),
        );
        assert_eq!(p.evaluate(), PredictionValue::Correct);
        p.given[0].state.value = TruthValue::False;
        assert_eq!(p.evaluate(), PredictionValue::Correct);
        assert!(p.active_condition_indexes().is_empty());
    }

    #[test]
    fn test_classification() {
        let p = prediction(
            vec![coin_condition("a", TruthValue::Undecided)],
            None,
            plain_predict(BoolExpr::Literal(0)),
        );
        assert_eq!(p.classify(), PredictionType::CoinOperatorFloatDeadline);

        let mut ranged = prediction(
            vec![coin_condition("a", TruthValue::Undecided)],
            None,
            plain_predict(BoolExpr::Literal(0)),
        );
        ranged.given[0].operator = Operator::Between;
        ranged.given[0].operands.push(Operand::Number(70000.0));
        assert_eq!(ranged.classify(), PredictionType::CoinWillRange);

        let complex = prediction(
            vec![coin_condition("a", TruthValue::Undecided)],
            None,
            plain_predict(BoolExpr::Not(Box::new(BoolExpr::Literal(0)))),
        );
        assert_eq!(complex.classify(), PredictionType::Unsupported);
    }
}
