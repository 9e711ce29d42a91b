//! Market-data supply path: the shared tick cache and the per-operand
//! ordered iterator that feeds condition evaluation.

pub mod cache;
pub mod iterator;

pub use cache::TickCache;
pub use iterator::MarketIterator;
