// =============================================================================
// Equity Screener — Main Entry Point
// =============================================================================
//
// Loads configuration, wires the Polygon/Yahoo providers into the batch
// scanner and serves the screen endpoints.  Reports persist to a JSON
// snapshot on shutdown and after every retention prune.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod indicators;
mod market_data;
mod numeric;
mod runtime_config;
mod scanner;
mod screens;
mod types;
mod verdict_store;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_data::{FundamentalsProvider, MarketDataProvider, PolygonClient, YahooClient};
use crate::runtime_config::RuntimeConfig;
use crate::verdict_store::VerdictStore;

const CONFIG_PATH: &str = "screener_config.json";
const DEFAULT_STORE_PATH: &str = "verdict_store.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Equity Screener — Starting Up                     ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(syms) = std::env::var("SCREENER_SYMBOLS") {
        config.override_symbols(&syms);
    }
    config.validate().context("invalid screener configuration")?;

    info!(
        symbols = config.symbols.len(),
        benchmark = %config.benchmark_symbol,
        option_symbol = %config.option_symbol,
        "Configured universe"
    );

    // ── 2. Providers ─────────────────────────────────────────────────────
    let polygon_key = std::env::var("POLYGON_API_KEY").unwrap_or_default();
    if polygon_key.is_empty() {
        warn!("POLYGON_API_KEY not set, bar requests will be rejected upstream");
    }
    let market: Arc<dyn MarketDataProvider> = Arc::new(PolygonClient::new(polygon_key)?);
    let fundamentals: Arc<dyn FundamentalsProvider> = Arc::new(YahooClient::new()?);

    // ── 3. Verdict store & shared state ──────────────────────────────────
    let store_path =
        std::env::var("SCREENER_STORE_PATH").unwrap_or_else(|_| DEFAULT_STORE_PATH.into());
    let store = Arc::new(VerdictStore::open(&store_path)?);

    let state = Arc::new(AppState::new(config, market, fundamentals, store));

    // ── 4. Retention pruning loop (hourly) ───────────────────────────────
    let prune_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let days = prune_state.runtime_config.read().retention_days;
            let removed = prune_state
                .store
                .prune_older_than(days, chrono::Utc::now());
            if removed == 0 {
                continue;
            }
            info!(removed, retention_days = days, "Pruned old scan reports");
            prune_state.increment_version();
            if let Err(e) = prune_state.store.save() {
                error!(error = %e, "Failed to save verdict store after pruning");
            }
        }
    });

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("SCREENER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping gracefully");

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }
    if let Err(e) = state.store.save() {
        error!(error = %e, "Failed to save verdict store on shutdown");
    }

    info!("Equity Screener shut down complete.");
    Ok(())
}
