//! Periodic evolution pass over every non-final prediction: page through the
//! store, evolve each prediction in isolation, persist all changes in one
//! batch and announce lifecycle milestones exactly once.

use crate::application::engine::market::Market;
use crate::application::engine::runner::PredictionRunner;
use crate::domain::ports::{
    Announcer, Interaction, PredictionFilters, PredictionOrderBy, PredictionStore,
};
use crate::domain::prediction::Prediction;
use crate::domain::types::{ActionType, PredictionValue};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Summary of one evolution pass, surfaced to the daemon loop for logging.
pub struct PassResult {
    pub scanned: usize,
    pub advanced: usize,
    pub finalized: Vec<Uuid>,
    /// Per-prediction failures; the pass itself still completed.
    pub errors: Vec<anyhow::Error>,
}

pub struct EvolutionEngine {
    store: Arc<dyn PredictionStore>,
    market: Market,
    announcer: Arc<dyn Announcer>,
    page_size: usize,
}

impl EvolutionEngine {
    pub fn new(
        store: Arc<dyn PredictionStore>,
        market: Market,
        announcer: Arc<dyn Announcer>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            market,
            announcer,
            page_size: page_size.max(1),
        }
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    /// Persist a freshly compiled prediction and announce its creation.
    pub async fn track(&self, prediction: Prediction) -> Result<Prediction> {
        let stored = self
            .store
            .upsert_predictions(std::slice::from_ref(&prediction))
            .await?
            .pop()
            .context("store returned no prediction from upsert")?;
        self.announce(&stored, ActionType::PredictionCreated).await;
        Ok(stored)
    }

    /// One full pass: evolve every ongoing prediction as far as currently
    /// available market data allows.
    ///
    /// A failing prediction never aborts the pass; its error is collected and
    /// the remaining predictions keep evolving. All state changes land in a
    /// single batched upsert at the end, so a crash mid-pass loses at most
    /// one pass of progress.
    pub async fn run_pass(&self) -> Result<PassResult> {
        let filters = PredictionFilters {
            values: vec![
                PredictionValue::OngoingPrePrediction,
                PredictionValue::OngoingPrediction,
            ],
            paused: Some(false),
            deleted: Some(false),
            ..PredictionFilters::default()
        };

        let mut scanned = 0;
        let mut errors: Vec<anyhow::Error> = Vec::new();
        let mut changed: Vec<Prediction> = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .store
                .get_predictions(&filters, PredictionOrderBy::PostedAtAsc, self.page_size, offset)
                .await
                .context("loading ongoing predictions")?;
            let page_len = page.len();
            scanned += page_len;

            for mut prediction in page {
                let outcome = PredictionRunner::new(&self.market).run(&mut prediction).await;
                errors.extend(
                    outcome
                        .errors
                        .into_iter()
                        .map(|e| e.context(format!("evolving {}", prediction.post_url))),
                );
                if outcome.dirty {
                    debug!(
                        post_url = %prediction.post_url,
                        value = %prediction.value(),
                        "prediction advanced"
                    );
                    changed.push(prediction);
                }
            }

            if page_len < self.page_size {
                break;
            }
            offset += page_len;
        }

        let mut finalized = Vec::new();
        if !changed.is_empty() {
            let stored = self
                .store
                .upsert_predictions(&changed)
                .await
                .context("persisting evolved predictions")?;
            for prediction in &stored {
                if prediction.is_final() {
                    if let Some(uuid) = prediction.uuid {
                        finalized.push(uuid);
                    }
                    info!(
                        post_url = %prediction.post_url,
                        value = %prediction.value(),
                        "prediction finalized"
                    );
                    self.announce(prediction, ActionType::BecameFinal).await;
                }
            }
        }

        Ok(PassResult {
            scanned,
            advanced: changed.len(),
            finalized,
            errors,
        })
    }

    /// Fire an announcement at most once per
    /// `(prediction, post_url, action_type)`. Failures are logged and retried
    /// on a later pass; they never fail the evolution itself.
    async fn announce(&self, prediction: &Prediction, action_type: ActionType) {
        match self
            .store
            .interaction_exists(prediction.uuid, &prediction.post_url, action_type)
            .await
        {
            Ok(true) => return,
            Ok(false) => {}
            Err(err) => {
                warn!(
                    post_url = %prediction.post_url,
                    "failed to check interaction log: {err:#}"
                );
                return;
            }
        }
        if let Err(err) = self.announcer.announce(prediction, action_type).await {
            warn!(
                post_url = %prediction.post_url,
                "announcement failed, will retry next pass: {err:#}"
            );
            return;
        }
        let interaction = Interaction {
            prediction_uuid: prediction.uuid,
            post_url: prediction.post_url.clone(),
            action_type,
            occurred_at: self.market.clock().now().timestamp(),
        };
        if let Err(err) = self.store.record_interaction(interaction).await {
            warn!(
                post_url = %prediction.post_url,
                "failed to record interaction: {err:#}"
            );
        }
    }
}
