// =============================================================================
// Central Application State
// =============================================================================
//
// Ties the screener's subsystems together for the HTTP layer and background
// loops.  Everything is shared via `Arc<AppState>`.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the runtime configuration.
//   - Scanner, universe and store manage their own interior mutability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use crate::market_data::{FundamentalsProvider, MarketDataProvider, Universe};
use crate::runtime_config::RuntimeConfig;
use crate::scanner::{ScanRequest, Scanner, ScannerSettings};
use crate::types::ScreenKind;
use crate::verdict_store::VerdictStore;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Incremented whenever a report is stored or caches are reset.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub scanner: Scanner,
    pub universe: Universe,
    pub store: Arc<VerdictStore>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        market: Arc<dyn MarketDataProvider>,
        fundamentals: Arc<dyn FundamentalsProvider>,
        store: Arc<VerdictStore>,
    ) -> Self {
        let scanner = Scanner::new(
            market,
            fundamentals,
            config.cache_ttl(),
            ScannerSettings {
                lookback_days: config.history_lookback_days,
                max_concurrent_fetches: config.max_concurrent_fetches,
                timeout: config.scan_timeout(),
            },
        );
        let universe = Universe::new(config.universe_ttl());

        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            scanner,
            universe,
            store,
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Scans ───────────────────────────────────────────────────────────

    /// Instruments a screen runs over: the option underlying for LEAP
    /// strategies, the sector members for sector breadth, otherwise
    /// `explicit` or the normalised universe.
    pub fn symbols_for(&self, screen: ScreenKind, explicit: Option<&[String]>) -> Vec<String> {
        let config = self.runtime_config.read();
        if screen.is_option_strategy() {
            return vec![config.option_symbol.clone()];
        }
        if screen == ScreenKind::SectorBreadth {
            return config
                .screens
                .sector_breadth
                .members(&config.unsupported_symbols);
        }
        match explicit {
            Some(raw) => crate::market_data::universe::normalise_symbols(
                raw,
                &config.unsupported_symbols,
            ),
            None => self
                .universe
                .symbols(&config.symbols, &config.unsupported_symbols)
                .as_ref()
                .clone(),
        }
    }

    /// Build a request from the current configuration.
    pub fn scan_request(&self, screen: ScreenKind, symbols: Vec<String>) -> ScanRequest {
        let config = self.runtime_config.read();
        ScanRequest {
            screen,
            symbols,
            params: config.screens.clone(),
            indicators: config.indicators.clone(),
            benchmark: config.benchmark_symbol.clone(),
        }
    }

    /// Clear universe and data caches.
    pub fn refresh_caches(&self) {
        self.universe.clear();
        self.scanner.clear_caches();
        self.increment_version();
        info!(at = %Utc::now(), "caches cleared");
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
