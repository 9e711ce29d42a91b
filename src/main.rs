//! Foretell daemon - prediction evolution loop
//!
//! Runs periodic evolution passes over every ongoing prediction, headless,
//! with structured logs to stdout.
//!
//! # Usage
//! ```sh
//! POLL_INTERVAL_SECS=60 cargo run
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use foretell::application::engine::{EvolutionEngine, Market};
use foretell::application::market::TickCache;
use foretell::config::Config;
use foretell::domain::compiler::Compiler;
use foretell::domain::ports::{Announcer, MetadataFetcher, PredictionStore};
use foretell::infrastructure::announce::LogAnnouncer;
use foretell::infrastructure::binance::BinanceMarketSource;
use foretell::infrastructure::clock::SystemClock;
use foretell::infrastructure::coinbase::CoinbaseMarketSource;
use foretell::infrastructure::memory::InMemoryPredictionStore;
use foretell::infrastructure::messari::MessariMarketSource;
use foretell::infrastructure::metadata::{HttpMetadataFetcher, NullMetadataFetcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run a single evolution pass and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between passes; overrides POLL_INTERVAL_SECS.
    #[arg(long)]
    interval: Option<u64>,

    /// Compile and track prediction JSON files before the first pass.
    #[arg(long = "track", value_name = "FILE")]
    track: Vec<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let interval = cli.interval.unwrap_or(config.poll_interval_secs);

    info!("Foretell {} starting...", env!("CARGO_PKG_VERSION"));

    let cache = Arc::new(TickCache::new(
        config.minutely_cache_capacity,
        config.daily_cache_capacity,
    ));
    let mut market = Market::new(cache, Arc::new(SystemClock));
    market.register(Arc::new(
        BinanceMarketSource::builder()
            .base_url(config.binance_base_url.clone())
            .build(),
    ));
    market.register(Arc::new(
        CoinbaseMarketSource::builder()
            .base_url(config.coinbase_base_url.clone())
            .build(),
    ));
    market.register(Arc::new(
        MessariMarketSource::builder()
            .base_url(config.messari_base_url.clone())
            .build(),
    ));

    let store: Arc<dyn PredictionStore> = Arc::new(InMemoryPredictionStore::new());
    let announcer: Arc<dyn Announcer> = if config.announcements_enabled {
        Arc::new(LogAnnouncer)
    } else {
        Arc::new(NullAnnouncer)
    };
    let engine = EvolutionEngine::new(store, market, announcer, config.page_size);

    if !cli.track.is_empty() {
        let fetcher: Arc<dyn MetadataFetcher> = if config.metadata_endpoint.is_empty() {
            Arc::new(NullMetadataFetcher)
        } else {
            Arc::new(HttpMetadataFetcher::new(config.metadata_endpoint.clone()))
        };
        let compiler = Compiler::new(Some(fetcher));
        for path in &cli.track {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let (prediction, _account) = compiler.compile(&raw).await?;
            let stored = engine.track(prediction).await?;
            info!(
                post_url = %stored.post_url,
                uuid = ?stored.uuid,
                "tracking prediction"
            );
        }
    }

    if cli.once {
        run_pass(&engine).await;
        return Ok(());
    }

    info!("Evolution loop running every {interval}s. Press Ctrl+C to shutdown.");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => run_pass(&engine).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting...");
                return Ok(());
            }
        }
    }
}

async fn run_pass(engine: &EvolutionEngine) {
    match engine.run_pass().await {
        Ok(result) => {
            info!(
                scanned = result.scanned,
                advanced = result.advanced,
                finalized = result.finalized.len(),
                "evolution pass complete"
            );
            for err in &result.errors {
                warn!("pass error: {err:#}");
            }
        }
        Err(err) => error!("evolution pass failed: {err:#}"),
    }
}

/// Swallows announcements when they are disabled by configuration.
struct NullAnnouncer;

#[async_trait::async_trait]
impl Announcer for NullAnnouncer {
    async fn announce(
        &self,
        _prediction: &foretell::domain::prediction::Prediction,
        _action_type: foretell::domain::types::ActionType,
    ) -> Result<()> {
        Ok(())
    }
}
