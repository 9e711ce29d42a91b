//! Port traits for the external collaborators this engine consumes: market
//! data providers, the persistence layer, the post-metadata fetcher and the
//! announcement surface. Implementations live under `infrastructure`.

use crate::domain::errors::MarketError;
use crate::domain::prediction::Prediction;
use crate::domain::types::{ActionType, Candlestick, Operand, PredictionValue, Provider, Tick};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Uniform adapter contract over one price-data provider.
///
/// Implementations must return [`MarketError::UnknownMarketPair`] when the
/// exchange has no such listing, and may return gapped sequences; callers
/// gap-fill.
#[async_trait]
pub trait MarketSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Recommended staleness buffer: how far behind `now` this provider's
    /// latest data should be trusted.
    fn patience(&self) -> Duration;

    async fn request_ticks(
        &self,
        operand: &Operand,
        start_time_ts: i64,
    ) -> Result<Vec<Tick>, MarketError>;

    async fn request_candlesticks(
        &self,
        operand: &Operand,
        start_time_ts: i64,
        interval_minutes: u32,
    ) -> Result<Vec<Candlestick>, MarketError>;
}

/// Query filters for the prediction store. Empty vectors / `None` mean
/// "no constraint".
#[derive(Debug, Clone, Default)]
pub struct PredictionFilters {
    pub uuids: Vec<Uuid>,
    pub post_urls: Vec<String>,
    pub author_handles: Vec<String>,
    pub values: Vec<PredictionValue>,
    pub paused: Option<bool>,
    pub hidden: Option<bool>,
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionOrderBy {
    #[default]
    PostedAtAsc,
    PostedAtDesc,
}

/// One recorded announcement side-action, the idempotency unit keyed by
/// `(post_url, action_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub prediction_uuid: Option<Uuid>,
    pub post_url: String,
    pub action_type: ActionType,
    pub occurred_at: i64,
}

/// Persistence collaborator. Internals (schema, engine) are out of scope;
/// the engine only relies on these operations.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn get_predictions(
        &self,
        filters: &PredictionFilters,
        order_by: PredictionOrderBy,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Prediction>>;

    /// Insert or update. Predictions without a UUID get one assigned; the
    /// stored (possibly updated) predictions are returned.
    async fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<Vec<Prediction>>;

    async fn pause_prediction(&self, uuid: Uuid) -> Result<()>;
    async fn unpause_prediction(&self, uuid: Uuid) -> Result<()>;
    async fn hide_prediction(&self, uuid: Uuid) -> Result<()>;
    async fn unhide_prediction(&self, uuid: Uuid) -> Result<()>;
    async fn delete_prediction(&self, uuid: Uuid) -> Result<()>;
    async fn undelete_prediction(&self, uuid: Uuid) -> Result<()>;

    async fn interaction_exists(
        &self,
        prediction_uuid: Option<Uuid>,
        post_url: &str,
        action_type: ActionType,
    ) -> Result<bool>;
    async fn record_interaction(&self, interaction: Interaction) -> Result<()>;
}

/// Author/timestamp metadata resolved from a post URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMetadata {
    pub author: String,
    pub author_handle: String,
    pub posted_at: DateTime<Utc>,
}

/// Social-account summary surfaced alongside a compiled prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub handle: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Optional collaborator that enriches a raw prediction missing its author
/// or posted-at timestamp. Its failure degrades to an ordinary
/// "field required" compile error.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, post_url: &str) -> Result<(PostMetadata, Account)>;
}

/// Best-effort announcement surface. Failures are logged only; idempotency
/// is enforced by the caller through the interaction log.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, prediction: &Prediction, action_type: ActionType) -> Result<()>;
}

/// Injectable time source so iterators and tests control "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
