//! Provider registry: routes an operand to its configured market source and
//! hands out iterators sharing one tick cache and one clock.

use crate::application::market::{MarketIterator, TickCache};
use crate::domain::errors::MarketError;
use crate::domain::ports::{Clock, MarketSource};
use crate::domain::types::{Operand, Provider};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Market {
    cache: Arc<TickCache>,
    sources: HashMap<Provider, Arc<dyn MarketSource>>,
    clock: Arc<dyn Clock>,
}

impl Market {
    pub fn new(cache: Arc<TickCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            sources: HashMap::new(),
            clock,
        }
    }

    pub fn register(&mut self, source: Arc<dyn MarketSource>) {
        self.sources.insert(source.provider(), source);
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Build an ordered observation stream for `operand` starting at
    /// `start_ts` (or one interval past it with `start_from_next`).
    pub fn iterator(
        &self,
        operand: &Operand,
        start_ts: i64,
        start_from_next: bool,
    ) -> Result<MarketIterator, MarketError> {
        let provider = operand.provider().ok_or(MarketError::InvalidOperand)?;
        let source = self
            .sources
            .get(&provider)
            .cloned()
            .ok_or_else(|| MarketError::UnsupportedProvider {
                provider: provider.to_string(),
            })?;
        MarketIterator::new(
            operand.clone(),
            start_ts,
            start_from_next,
            Arc::clone(&self.cache),
            source,
            Arc::clone(&self.clock),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{FixedClock, MockMarketSource};
    use chrono::Utc;

    #[test]
    fn test_unregistered_provider_is_rejected() {
        let market = Market::new(
            Arc::new(TickCache::default()),
            Arc::new(FixedClock::new(Utc::now())),
        );
        let operand = Operand::Coin {
            provider: Provider::Binance,
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
        };
        assert!(matches!(
            market.iterator(&operand, 0, false),
            Err(MarketError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_registered_provider_yields_iterator() {
        let mut market = Market::new(
            Arc::new(TickCache::default()),
            Arc::new(FixedClock::new(Utc::now())),
        );
        market.register(Arc::new(MockMarketSource::new(Provider::Binance)));
        let operand = Operand::Coin {
            provider: Provider::Binance,
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
        };
        assert!(market.iterator(&operand, 0, false).is_ok());
    }
}
