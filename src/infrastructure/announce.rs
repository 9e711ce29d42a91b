//! Announcement surfaces. The log announcer is the default; a real social
//! integration implements the same port.

use crate::domain::ports::Announcer;
use crate::domain::prediction::Prediction;
use crate::domain::types::ActionType;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn announce(&self, prediction: &Prediction, action_type: ActionType) -> Result<()> {
        info!(
            post_url = %prediction.post_url,
            value = %prediction.value(),
            ?action_type,
            "announcing prediction milestone"
        );
        Ok(())
    }
}
