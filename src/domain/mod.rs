pub mod compiler;
pub mod condition;
pub mod errors;
pub mod expression;
pub mod ports;
pub mod prediction;
pub mod types;
