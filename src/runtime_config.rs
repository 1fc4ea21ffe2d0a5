// =============================================================================
// Runtime Configuration — screener settings with atomic save
// =============================================================================
//
// Every tunable parameter of the screener lives here: the symbol universe,
// upstream limits, cache lifetimes, indicator windows and the parameters of
// every screen.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::IndicatorConfig;
use crate::screens::ScreenParams;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    [
        "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "AVGO", "TSLA", "BRK.B", "JPM", "LLY",
        "V", "UNH", "XOM", "MA", "COST", "HD", "PG", "NFLX", "AMD",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_unsupported_symbols() -> Vec<String> {
    vec!["BRK.B".to_string(), "BF.B".to_string()]
}

fn default_benchmark_symbol() -> String {
    "SPY".to_string()
}

fn default_option_symbol() -> String {
    "QQQ".to_string()
}

fn default_history_lookback_days() -> i64 {
    730
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_universe_ttl_secs() -> u64 {
    3600
}

fn default_scan_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent_fetches() -> usize {
    10
}

fn default_retention_days() -> i64 {
    30
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the screener.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Universe -----------------------------------------------------------

    /// Equity universe screened by the batch endpoints.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Symbols the data provider cannot serve; dropped during normalisation.
    #[serde(default = "default_unsupported_symbols")]
    pub unsupported_symbols: Vec<String>,

    /// Market benchmark (CANSLIM market gate and relative strength).
    #[serde(default = "default_benchmark_symbol")]
    pub benchmark_symbol: String,

    /// Underlying for the LEAP option signals.
    #[serde(default = "default_option_symbol")]
    pub option_symbol: String,

    // --- Upstream & caching -------------------------------------------------

    /// Calendar days of daily history requested per instrument.
    #[serde(default = "default_history_lookback_days")]
    pub history_lookback_days: i64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_universe_ttl_secs")]
    pub universe_ttl_secs: u64,

    /// Whole-batch deadline.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Upper bound on upstream requests in flight.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Stored reports older than this many days are pruned.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    // --- Indicators & screens -----------------------------------------------

    #[serde(default)]
    pub indicators: IndicatorConfig,

    #[serde(default)]
    pub screens: ScreenParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            unsupported_symbols: default_unsupported_symbols(),
            benchmark_symbol: default_benchmark_symbol(),
            option_symbol: default_option_symbol(),
            history_lookback_days: default_history_lookback_days(),
            cache_ttl_secs: default_cache_ttl_secs(),
            universe_ttl_secs: default_universe_ttl_secs(),
            scan_timeout_secs: default_scan_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            retention_days: default_retention_days(),
            indicators: IndicatorConfig::default(),
            screens: ScreenParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = config.symbols.len(),
            benchmark = %config.benchmark_symbol,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Replace the universe with a comma-separated list (`SCREENER_SYMBOLS`).
    /// Blank input leaves the configured universe untouched.
    pub fn override_symbols(&mut self, raw: &str) {
        let symbols: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !symbols.is_empty() {
            self.symbols = symbols;
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.benchmark_symbol.trim().is_empty() || self.option_symbol.trim().is_empty() {
            bail!("benchmark_symbol and option_symbol must be set");
        }
        if self.history_lookback_days <= 0 {
            bail!("history_lookback_days must be positive, got {}", self.history_lookback_days);
        }
        if self.max_concurrent_fetches == 0 {
            bail!("max_concurrent_fetches must be at least 1");
        }
        if self.scan_timeout_secs == 0 {
            bail!("scan_timeout_secs must be positive");
        }
        if self.retention_days <= 0 {
            bail!("retention_days must be positive, got {}", self.retention_days);
        }
        self.indicators.validate().context("invalid indicator config")?;
        self.screens.validate().context("invalid screen parameters")?;
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn universe_ttl(&self) -> Duration {
        Duration::from_secs(self.universe_ttl_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}
