//! Adapters for the domain ports: provider HTTP clients, persistence,
//! metadata resolution, announcement surfaces and clocks.

pub mod announce;
pub mod binance;
pub mod clock;
pub mod coinbase;
pub mod http_client;
pub mod memory;
pub mod messari;
pub mod metadata;
pub mod mock;
