//! Evolution engine: the periodic pass that advances every ongoing
//! prediction against fresh market data.

pub mod evolution;
pub mod market;
pub mod runner;

pub use evolution::{EvolutionEngine, PassResult};
pub use market::Market;
pub use runner::{PredictionRunner, RunOutcome};
