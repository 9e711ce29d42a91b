//! Raw input model and the compile entry point turning claim JSON into a
//! [`Prediction`].

use crate::domain::compiler::condition::parse_condition;
use crate::domain::compiler::expression::parse_bool_expr;
use crate::domain::condition::Condition;
use crate::domain::errors::{CompileError, ParseError};
use crate::domain::ports::{Account, MetadataFetcher};
use crate::domain::prediction::{Predict, PrePredict, Prediction, PredictionState};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCondition {
    pub condition: String,
    #[serde(rename = "fromISO8601", default)]
    pub from_iso8601: Option<String>,
    #[serde(rename = "toISO8601", default)]
    pub to_iso8601: Option<String>,
    #[serde(default)]
    pub to_duration: Option<String>,
    #[serde(default)]
    pub error_margin_ratio: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExpressions {
    #[serde(default)]
    pub wrong_if: Option<String>,
    #[serde(default)]
    pub annulled_if: Option<String>,
    #[serde(default)]
    pub predict: Option<String>,
    #[serde(default)]
    pub annulled_if_predict_is_false: bool,
    #[serde(default)]
    pub ignore_undecided_if_predict_is_defined: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPrediction {
    #[serde(default)]
    pub reporter: Option<String>,
    #[serde(default)]
    pub post_url: Option<String>,
    #[serde(default)]
    pub post_author: Option<String>,
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(default)]
    pub given: HashMap<String, RawCondition>,
    #[serde(default)]
    pub pre_predict: Option<RawExpressions>,
    #[serde(default)]
    pub predict: Option<RawExpressions>,
}

/// Compiles raw claim JSON into an immutable prediction, optionally
/// enriching author/timestamp through a metadata fetcher.
pub struct Compiler {
    metadata_fetcher: Option<Arc<dyn MetadataFetcher>>,
}

impl Compiler {
    pub fn new(metadata_fetcher: Option<Arc<dyn MetadataFetcher>>) -> Self {
        Self { metadata_fetcher }
    }

    pub async fn compile(
        &self,
        raw_json: &str,
    ) -> Result<(Prediction, Option<Account>), CompileError> {
        let raw: RawPrediction = serde_json::from_str(raw_json)?;

        let reporter = required(raw.reporter, "reporter")?;
        let post_url = required(raw.post_url, "postUrl")?;

        // Best-effort enrichment: a fetch failure falls through to the plain
        // "field required" error below.
        let mut post_author = raw.post_author;
        let mut posted_at_text = raw.posted_at;
        let mut account = None;
        if post_author.is_none() || posted_at_text.is_none() {
            if let Some(fetcher) = &self.metadata_fetcher {
                match fetcher.fetch(&post_url).await {
                    Ok((metadata, fetched_account)) => {
                        post_author.get_or_insert(metadata.author);
                        posted_at_text.get_or_insert(metadata.posted_at.to_rfc3339());
                        account = Some(fetched_account);
                    }
                    Err(err) => {
                        warn!("metadata fetch for {} failed: {:#}", post_url, err);
                    }
                }
            }
        }
        let post_author = required(post_author, "postAuthor")?;
        let posted_at_text = required(posted_at_text, "postedAt")?;
        let posted_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&posted_at_text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| {
                CompileError::Parse(ParseError::InvalidTimestamp {
                    value: posted_at_text.clone(),
                })
            })?;

        if raw.given.is_empty() {
            return Err(CompileError::MissingField {
                field: "given".to_string(),
            });
        }
        // Name order keeps compilation deterministic regardless of JSON map
        // iteration order.
        let mut names: Vec<&String> = raw.given.keys().collect();
        names.sort();
        let mut given: Vec<Condition> = Vec::with_capacity(names.len());
        let mut defs: HashMap<String, usize> = HashMap::with_capacity(names.len());
        for (index, name) in names.into_iter().enumerate() {
            let condition = parse_condition(name, &raw.given[name], posted_at)?;
            defs.insert(name.clone(), index);
            given.push(condition);
        }

        let pre_predict = match raw.pre_predict {
            Some(raw_pre) => compile_pre_predict(&raw_pre, &defs)?,
            None => None,
        };

        let raw_predict = raw.predict.ok_or(CompileError::MissingField {
            field: "predict".to_string(),
        })?;
        let predict_text = required(raw_predict.predict, "predict.predict")?;
        let predict = Predict {
            wrong_if: parse_optional(&raw_predict.wrong_if, &defs)?,
            annulled_if: parse_optional(&raw_predict.annulled_if, &defs)?,
            predict: parse_bool_expr(&predict_text, &defs)?,
            annulled_if_predict_is_false: raw_predict.annulled_if_predict_is_false,
            ignore_undecided_if_predict_is_defined: raw_predict
                .ignore_undecided_if_predict_is_defined,
        };

        let mut prediction = Prediction {
            uuid: None,
            reporter,
            post_url,
            post_author,
            posted_at: posted_at.timestamp(),
            given,
            pre_predict,
            predict,
            prediction_type: crate::domain::prediction::PredictionType::Unsupported,
            state: PredictionState::default(),
            paused: false,
            hidden: false,
            deleted: false,
        };
        prediction.prediction_type = prediction.classify();
        prediction.state.value = Some(prediction.initial_value());

        Ok((prediction, account))
    }
}

fn compile_pre_predict(
    raw: &RawExpressions,
    defs: &HashMap<String, usize>,
) -> Result<Option<PrePredict>, CompileError> {
    if raw.predict.is_none() {
        if raw.wrong_if.is_some() || raw.annulled_if.is_some() {
            return Err(CompileError::PrePredictWithoutPredict);
        }
        return Ok(None);
    }
    Ok(Some(PrePredict {
        wrong_if: parse_optional(&raw.wrong_if, defs)?,
        annulled_if: parse_optional(&raw.annulled_if, defs)?,
        predict: parse_optional(&raw.predict, defs)?,
        annulled_if_predict_is_false: raw.annulled_if_predict_is_false,
        ignore_undecided_if_predict_is_defined: raw.ignore_undecided_if_predict_is_defined,
    }))
}

fn parse_optional(
    text: &Option<String>,
    defs: &HashMap<String, usize>,
) -> Result<Option<crate::domain::expression::BoolExpr>, ParseError> {
    text.as_ref()
        .map(|t| parse_bool_expr(t, defs))
        .transpose()
}

fn required(value: Option<String>, field: &str) -> Result<String, CompileError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CompileError::MissingField {
            field: field.to_string(),
        }),
    }
}
