//! Evaluation engine for cryptocurrency predictions: compiles claim posts
//! into typed condition trees, streams market data against them and settles
//! each prediction as CORRECT, INCORRECT or ANNULLED.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
