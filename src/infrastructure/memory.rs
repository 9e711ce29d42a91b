//! In-memory prediction store. The reference persistence used by the daemon
//! in single-process mode and by the test suite.

use crate::domain::ports::{
    Interaction, PredictionFilters, PredictionOrderBy, PredictionStore,
};
use crate::domain::prediction::Prediction;
use crate::domain::types::ActionType;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryPredictionStore {
    predictions: RwLock<HashMap<Uuid, Prediction>>,
    interactions: RwLock<Vec<Interaction>>,
}

impl InMemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_flag(
        &self,
        uuid: Uuid,
        update: impl FnOnce(&mut Prediction),
    ) -> Result<()> {
        let mut predictions = self.predictions.write().await;
        match predictions.get_mut(&uuid) {
            Some(prediction) => {
                update(prediction);
                Ok(())
            }
            None => bail!("prediction {uuid} not found"),
        }
    }
}

fn matches(prediction: &Prediction, filters: &PredictionFilters) -> bool {
    if !filters.uuids.is_empty()
        && !prediction.uuid.is_some_and(|u| filters.uuids.contains(&u))
    {
        return false;
    }
    if !filters.post_urls.is_empty() && !filters.post_urls.contains(&prediction.post_url) {
        return false;
    }
    if !filters.author_handles.is_empty()
        && !filters.author_handles.contains(&prediction.post_author)
    {
        return false;
    }
    if !filters.values.is_empty() && !filters.values.contains(&prediction.value()) {
        return false;
    }
    if filters.paused.is_some_and(|p| p != prediction.paused) {
        return false;
    }
    if filters.hidden.is_some_and(|h| h != prediction.hidden) {
        return false;
    }
    if filters.deleted.is_some_and(|d| d != prediction.deleted) {
        return false;
    }
    true
}

#[async_trait]
impl PredictionStore for InMemoryPredictionStore {
    async fn get_predictions(
        &self,
        filters: &PredictionFilters,
        order_by: PredictionOrderBy,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Prediction>> {
        let predictions = self.predictions.read().await;
        let mut selected: Vec<Prediction> = predictions
            .values()
            .filter(|p| matches(p, filters))
            .cloned()
            .collect();
        selected.sort_by_key(|p| (p.posted_at, p.uuid));
        if order_by == PredictionOrderBy::PostedAtDesc {
            selected.reverse();
        }
        Ok(selected.into_iter().skip(offset).take(limit).collect())
    }

    async fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<Vec<Prediction>> {
        let mut stored = self.predictions.write().await;
        let mut result = Vec::with_capacity(predictions.len());
        for prediction in predictions {
            let mut prediction = prediction.clone();
            let uuid = prediction.uuid.unwrap_or_else(Uuid::new_v4);
            prediction.uuid = Some(uuid);
            stored.insert(uuid, prediction.clone());
            result.push(prediction);
        }
        Ok(result)
    }

    async fn pause_prediction(&self, uuid: Uuid) -> Result<()> {
        self.update_flag(uuid, |p| p.paused = true).await
    }

    async fn unpause_prediction(&self, uuid: Uuid) -> Result<()> {
        self.update_flag(uuid, |p| p.paused = false).await
    }

    async fn hide_prediction(&self, uuid: Uuid) -> Result<()> {
        self.update_flag(uuid, |p| p.hidden = true).await
    }

    async fn unhide_prediction(&self, uuid: Uuid) -> Result<()> {
        self.update_flag(uuid, |p| p.hidden = false).await
    }

    async fn delete_prediction(&self, uuid: Uuid) -> Result<()> {
        self.update_flag(uuid, |p| p.deleted = true).await
    }

    async fn undelete_prediction(&self, uuid: Uuid) -> Result<()> {
        self.update_flag(uuid, |p| p.deleted = false).await
    }

    async fn interaction_exists(
        &self,
        prediction_uuid: Option<Uuid>,
        post_url: &str,
        action_type: ActionType,
    ) -> Result<bool> {
        let interactions = self.interactions.read().await;
        Ok(interactions.iter().any(|i| {
            i.prediction_uuid == prediction_uuid
                && i.post_url == post_url
                && i.action_type == action_type
        }))
    }

    async fn record_interaction(&self, interaction: Interaction) -> Result<()> {
        self.interactions.write().await.push(interaction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::Condition;
    use crate::domain::expression::BoolExpr;
    use crate::domain::prediction::{Predict, PredictionState, PredictionType};
    use crate::domain::types::{Operand, Operator, PredictionValue, Provider};

    fn prediction(post_url: &str, posted_at: i64) -> Prediction {
        let condition = Condition {
            name: "main".to_string(),
            operator: Operator::Gte,
            operands: vec![
                Operand::Coin {
                    provider: Provider::Binance,
                    base_asset: "BTC".to_string(),
                    quote_asset: "USDT".to_string(),
                },
                Operand::Number(100_000.0),
            ],
            from_ts: posted_at,
            to_ts: posted_at + 86_400,
            to_duration: None,
            error_margin_ratio: 0.0,
            state: Default::default(),
        };
        let mut p = Prediction {
            uuid: None,
            reporter: "admin".to_string(),
            post_url: post_url.to_string(),
            post_author: "someone".to_string(),
            posted_at,
            given: vec![condition],
            pre_predict: None,
            predict: Predict {
                wrong_if: None,
                annulled_if: None,
                predict: BoolExpr::Literal(0),
                annulled_if_predict_is_false: false,
                ignore_undecided_if_predict_is_defined: false,
            },
            prediction_type: PredictionType::CoinOperatorFloatDeadline,
            state: PredictionState::default(),
            paused: false,
            hidden: false,
            deleted: false,
        };
        p.state.value = Some(p.initial_value());
        p
    }

    #[tokio::test]
    async fn test_upsert_assigns_uuid_once() {
        let store = InMemoryPredictionStore::new();
        let stored = store
            .upsert_predictions(&[prediction("https://example.com/1", 100)])
            .await
            .unwrap();
        let uuid = stored[0].uuid.unwrap();

        let again = store.upsert_predictions(&stored).await.unwrap();
        assert_eq!(again[0].uuid, Some(uuid));
        let all = store
            .get_predictions(&PredictionFilters::default(), Default::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_filters_by_value_and_flags() {
        let store = InMemoryPredictionStore::new();
        let mut correct = prediction("https://example.com/1", 100);
        correct.state.value = Some(PredictionValue::Correct);
        let mut paused = prediction("https://example.com/2", 200);
        paused.paused = true;
        let ongoing = prediction("https://example.com/3", 300);
        store
            .upsert_predictions(&[correct, paused, ongoing])
            .await
            .unwrap();

        let filters = PredictionFilters {
            values: vec![
                PredictionValue::OngoingPrePrediction,
                PredictionValue::OngoingPrediction,
            ],
            paused: Some(false),
            deleted: Some(false),
            ..PredictionFilters::default()
        };
        let found = store
            .get_predictions(&filters, Default::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].post_url, "https://example.com/3");
    }

    #[tokio::test]
    async fn test_ordering_and_paging() {
        let store = InMemoryPredictionStore::new();
        for i in 0..5 {
            store
                .upsert_predictions(&[prediction(&format!("https://example.com/{i}"), i * 100)])
                .await
                .unwrap();
        }

        let page = store
            .get_predictions(
                &PredictionFilters::default(),
                PredictionOrderBy::PostedAtAsc,
                2,
                2,
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].posted_at, 200);
        assert_eq!(page[1].posted_at, 300);

        let newest = store
            .get_predictions(
                &PredictionFilters::default(),
                PredictionOrderBy::PostedAtDesc,
                1,
                0,
            )
            .await
            .unwrap();
        assert_eq!(newest[0].posted_at, 400);
    }

    #[tokio::test]
    async fn test_flag_updates() {
        let store = InMemoryPredictionStore::new();
        let stored = store
            .upsert_predictions(&[prediction("https://example.com/1", 100)])
            .await
            .unwrap();
        let uuid = stored[0].uuid.unwrap();

        store.pause_prediction(uuid).await.unwrap();
        store.hide_prediction(uuid).await.unwrap();
        let found = store
            .get_predictions(&PredictionFilters::default(), Default::default(), 1, 0)
            .await
            .unwrap();
        assert!(found[0].paused);
        assert!(found[0].hidden);

        store.unpause_prediction(uuid).await.unwrap();
        store.delete_prediction(uuid).await.unwrap();
        let found = store
            .get_predictions(&PredictionFilters::default(), Default::default(), 1, 0)
            .await
            .unwrap();
        assert!(!found[0].paused);
        assert!(found[0].deleted);

        assert!(store.pause_prediction(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_interaction_log_is_keyed_by_prediction_url_and_action() {
        let store = InMemoryPredictionStore::new();
        let url = "https://example.com/1";
        let uuid = Some(Uuid::new_v4());
        assert!(
            !store
                .interaction_exists(uuid, url, ActionType::PredictionCreated)
                .await
                .unwrap()
        );
        store
            .record_interaction(Interaction {
                prediction_uuid: uuid,
                post_url: url.to_string(),
                action_type: ActionType::PredictionCreated,
                occurred_at: 100,
            })
            .await
            .unwrap();
        assert!(
            store
                .interaction_exists(uuid, url, ActionType::PredictionCreated)
                .await
                .unwrap()
        );
        assert!(
            !store
                .interaction_exists(uuid, url, ActionType::BecameFinal)
                .await
                .unwrap()
        );
        // A different prediction tracked from the same post keeps its own key.
        assert!(
            !store
                .interaction_exists(Some(Uuid::new_v4()), url, ActionType::PredictionCreated)
                .await
                .unwrap()
        );
    }
}
