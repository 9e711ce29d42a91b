pub mod engine;
pub mod market;
