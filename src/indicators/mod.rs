// =============================================================================
// Technical Indicators Module — the Indicator Engine
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators used by the
// screens.  Every series is aligned 1:1 with the input bars and uses `None`
// for entries that are undefined (window not yet full, division by zero),
// so callers are forced to handle insufficient data explicitly.
//
// `compute_indicators` bundles the configured set into an `IndicatorSet`
// keyed by name (e.g. "SMA_200", "EMA_21", "RSI_14", "BB_UPPER_20").

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod psar;
pub mod rsi;
pub mod sma;
pub mod stochastic;

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::market_data::PriceSeries;
use crate::numeric::{nth_back, Series};

pub use psar::PsarParams;
pub use rsi::RsiMethod;

// =============================================================================
// Indicator names
// =============================================================================

pub const MACD: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD_SIGNAL";
pub const MACD_HIST: &str = "MACD_HIST";
pub const PSAR: &str = "PSAR";

pub fn sma_key(window: usize) -> String {
    format!("SMA_{window}")
}

pub fn ema_key(span: usize) -> String {
    format!("EMA_{span}")
}

pub fn bb_upper_key(window: usize) -> String {
    format!("BB_UPPER_{window}")
}

pub fn bb_middle_key(window: usize) -> String {
    format!("BB_MIDDLE_{window}")
}

pub fn bb_lower_key(window: usize) -> String {
    format!("BB_LOWER_{window}")
}

pub fn stoch_k_key(window: usize) -> String {
    format!("STOCH_K_{window}")
}

pub fn stoch_d_key(window: usize) -> String {
    format!("STOCH_D_{window}")
}

pub fn volume_sma_key(window: usize) -> String {
    format!("VOLUME_SMA_{window}")
}

pub fn rsi_key(window: usize, method: RsiMethod) -> String {
    match method {
        RsiMethod::Simple => format!("RSI_{window}"),
        RsiMethod::Wilder => format!("RSI_WILDER_{window}"),
    }
}

// =============================================================================
// Configuration
// =============================================================================

fn default_sma_windows() -> Vec<usize> {
    vec![50, 100, 150, 200]
}

fn default_ema_spans() -> Vec<usize> {
    vec![12, 21, 26, 50]
}

fn default_rsi_window() -> usize {
    14
}

fn default_bollinger_window() -> usize {
    20
}

fn default_bollinger_std() -> f64 {
    2.0
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_stoch_k() -> usize {
    14
}

fn default_stoch_d() -> usize {
    3
}

fn default_psar_step() -> f64 {
    0.02
}

fn default_psar_max_step() -> f64 {
    0.2
}

fn default_volume_window() -> usize {
    20
}

/// Which indicators to compute and their window parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_sma_windows")]
    pub sma_windows: Vec<usize>,
    #[serde(default = "default_ema_spans")]
    pub ema_spans: Vec<usize>,
    /// Both RSI variants are computed with this window.
    #[serde(default = "default_rsi_window")]
    pub rsi_window: usize,
    #[serde(default = "default_bollinger_window")]
    pub bollinger_window: usize,
    #[serde(default = "default_bollinger_std")]
    pub bollinger_std: f64,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_stoch_k")]
    pub stoch_k_window: usize,
    #[serde(default = "default_stoch_d")]
    pub stoch_d_window: usize,
    #[serde(default = "default_psar_step")]
    pub psar_step: f64,
    #[serde(default = "default_psar_max_step")]
    pub psar_max_step: f64,
    #[serde(default = "default_volume_window")]
    pub volume_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_windows: default_sma_windows(),
            ema_spans: default_ema_spans(),
            rsi_window: default_rsi_window(),
            bollinger_window: default_bollinger_window(),
            bollinger_std: default_bollinger_std(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            stoch_k_window: default_stoch_k(),
            stoch_d_window: default_stoch_d(),
            psar_step: default_psar_step(),
            psar_max_step: default_psar_max_step(),
            volume_window: default_volume_window(),
        }
    }
}

impl IndicatorConfig {
    /// Reject configurations that cannot produce meaningful output.
    pub fn validate(&self) -> Result<()> {
        if let Some(w) = self.sma_windows.iter().find(|w| **w == 0) {
            bail!("invalid SMA window {w}");
        }
        if self.ema_spans.iter().any(|s| *s == 0) {
            bail!("invalid EMA span 0");
        }
        let windows = [
            ("rsi_window", self.rsi_window),
            ("macd_signal", self.macd_signal),
            ("stoch_k_window", self.stoch_k_window),
            ("stoch_d_window", self.stoch_d_window),
            ("volume_window", self.volume_window),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, w)| *w == 0) {
            bail!("{name} must be positive");
        }
        if self.bollinger_window < 2 {
            bail!(
                "bollinger_window must be at least 2 (sample std), got {}",
                self.bollinger_window
            );
        }
        if !(self.bollinger_std.is_finite() && self.bollinger_std > 0.0) {
            bail!("bollinger_std must be positive, got {}", self.bollinger_std);
        }
        if self.macd_fast == 0 || self.macd_fast >= self.macd_slow {
            bail!(
                "macd_fast ({}) must be positive and below macd_slow ({})",
                self.macd_fast,
                self.macd_slow
            );
        }
        if !(self.psar_step > 0.0 && self.psar_step <= self.psar_max_step) {
            bail!(
                "psar_step ({}) must be positive and not above psar_max_step ({})",
                self.psar_step,
                self.psar_max_step
            );
        }
        Ok(())
    }

    /// Add an SMA window if it is not already configured.
    pub fn require_sma(&mut self, window: usize) -> &mut Self {
        if !self.sma_windows.contains(&window) {
            self.sma_windows.push(window);
        }
        self
    }

    /// Add an EMA span if it is not already configured.
    pub fn require_ema(&mut self, span: usize) -> &mut Self {
        if !self.ema_spans.contains(&span) {
            self.ema_spans.push(span);
        }
        self
    }

    pub fn psar_params(&self) -> PsarParams {
        PsarParams {
            step: self.psar_step,
            max_step: self.psar_max_step,
        }
    }
}

// =============================================================================
// IndicatorSet
// =============================================================================

/// Named indicator series derived from (and aligned with) one PriceSeries.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    len: usize,
    series: BTreeMap<String, Series>,
}

impl IndicatorSet {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            series: BTreeMap::new(),
        }
    }

    /// Insert a series. Panics in debug builds if it is misaligned.
    pub fn insert(&mut self, name: impl Into<String>, series: Series) {
        debug_assert_eq!(series.len(), self.len, "indicator series misaligned");
        self.series.insert(name.into(), series);
    }

    pub fn get(&self, name: &str) -> Option<&Series> {
        self.series.get(name)
    }

    #[cfg(test)]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Value of `name` at the last bar; `None` when missing or undefined.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.back(name, 0)
    }

    /// Value of `name` `offset` bars before the last one.
    pub fn back(&self, name: &str, offset: usize) -> Option<f64> {
        nth_back(self.get(name)?, offset)
    }

    #[cfg(test)]
    pub fn at(&self, name: &str, index: usize) -> Option<f64> {
        self.get(name)?.get(index).copied().flatten()
    }
}

/// Compute every configured indicator for `series`.
///
/// Short input never fails: indicators whose window cannot be filled are
/// present but entirely undefined.
pub fn compute_indicators(series: &PriceSeries, config: &IndicatorConfig) -> IndicatorSet {
    let closes = series.closes();
    let highs = series.highs();
    let lows = series.lows();
    let volumes = series.volumes();

    let mut set = IndicatorSet::new(series.len());

    for &w in &config.sma_windows {
        set.insert(sma_key(w), sma::calculate_sma(&closes, w));
    }
    for &s in &config.ema_spans {
        set.insert(ema_key(s), ema::calculate_ema(&closes, s));
    }
    for method in [RsiMethod::Simple, RsiMethod::Wilder] {
        set.insert(
            rsi_key(config.rsi_window, method),
            rsi::calculate_rsi(&closes, config.rsi_window, method),
        );
    }

    let bb = bollinger::calculate_bollinger(&closes, config.bollinger_window, config.bollinger_std);
    set.insert(bb_upper_key(config.bollinger_window), bb.upper);
    set.insert(bb_middle_key(config.bollinger_window), bb.middle);
    set.insert(bb_lower_key(config.bollinger_window), bb.lower);

    let m = macd::calculate_macd(&closes, config.macd_fast, config.macd_slow, config.macd_signal);
    set.insert(MACD, m.macd);
    set.insert(MACD_SIGNAL, m.signal);
    set.insert(MACD_HIST, m.histogram);

    let st = stochastic::calculate_stochastic(
        &closes,
        &highs,
        &lows,
        config.stoch_k_window,
        config.stoch_d_window,
    );
    set.insert(stoch_k_key(config.stoch_k_window), st.k);
    set.insert(stoch_d_key(config.stoch_d_window), st.d);

    set.insert(PSAR, psar::calculate_psar(&highs, &lows, &closes, config.psar_params()));
    set.insert(
        volume_sma_key(config.volume_window),
        sma::calculate_sma(&volumes, config.volume_window),
    );

    set
}
