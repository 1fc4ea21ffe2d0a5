// =============================================================================
// CANSLIM — earnings growth, new highs, volume demand, leadership, sponsorship
// =============================================================================
//
// Per instrument, all of:
//   C  quarterly net-income growth >= 25%
//   A  trailing-year net-income growth >= 25% (undefined tolerated unless
//      the preset requires it)
//   N  close >= ratio * 52-week high close
//   S  mean volume of the last 20 bars >= pct above the preceding 30 bars
//   L  relative strength vs the benchmark over 120 bars >= threshold
//   I  reputable institutional sponsorship
//
// M  (market direction) is a batch gate: when the benchmark SMA50 is not
//    above its SMA200 the whole batch returns no passes.
//
// Two presets exist.  `canonical` is the current screen; `legacy` keeps the
// stricter thresholds of the first version.

use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Evaluation;
use crate::indicators::sma::calculate_sma;
use crate::market_data::{Fundamentals, PriceSeries};
use crate::numeric::{last, mean, safe_div, trailing_max};
use crate::types::VerdictResult;

/// Asset managers counted as reputable sponsors (case-insensitive substring).
/// Every matching entry counts once, so a holder named "Fundsmith LLP"
/// matches both "Fundsmith" and "Fundsmith LLP".
pub const REPUTABLE_INSTITUTIONS: &[&str] = &[
    "Vanguard",
    "Blackrock",
    "State Street",
    "Fidelity",
    "T. Rowe",
    "Invesco",
    "Morgan Stanley",
    "JPMORGAN",
    "Bank of America",
    "Wellington",
    "Geode",
    "Northern Trust",
    "Goldman Sachs",
    "UBS",
    "Franklin",
    "Charles Schwab",
    "Capital Group",
    "Dodge & Cox",
    "Massachusetts Financial",
    "FMR",
    "FIL LTD",
    "Price (T.Rowe)",
    "Ameriprise",
    "Alliancebernstein",
    "Fundsmith",
    "NORGES BANK",
    "Cohen & Steers",
    "Parnassus",
    "Susquehanna",
    "Victory Capital",
    "Apg Asset Management",
    "Hotchkis & Wiley",
    "Polen Capital",
    "Kayne Anderson",
    "Leonard Green",
    "Renaissance Technologies",
    "State Farm",
    "Aristotle Capital",
    "First Eagle",
    "Boston Partners",
    "Slate Path Capital",
    "Durable Capital",
    "Artisan Partners",
    "Brown Advisory",
    "Barrow, Hanley",
    "Harris Associates",
    "Primecap",
    "Impax Asset",
    "Pictet Asset",
    "Amundi",
    "Royal Bank of Canada",
    "Bank Of New York Mellon",
    "Fundsmith Investment",
    "Fundsmith LLP",
    "Fundsmith Investment Services",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanslimPreset {
    Canonical,
    Legacy,
}

impl CanslimPreset {
    pub fn params(self) -> CanslimParams {
        match self {
            Self::Canonical => CanslimParams::canonical(),
            Self::Legacy => CanslimParams::legacy(),
        }
    }
}

impl FromStr for CanslimPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "canonical" | "relaxed" => Ok(Self::Canonical),
            "legacy" | "strict" => Ok(Self::Legacy),
            other => bail!("unknown CANSLIM preset '{other}' (expected canonical or legacy)"),
        }
    }
}

fn canonical() -> CanslimParams {
    CanslimParams::canonical()
}

macro_rules! canonical_default {
    ($name:ident, $field:ident, $ty:ty) => {
        fn $name() -> $ty {
            canonical().$field
        }
    };
}

canonical_default!(default_min_quarterly_growth, min_quarterly_growth, f64);
canonical_default!(default_min_annual_growth, min_annual_growth, f64);
canonical_default!(default_require_annual_growth, require_annual_growth, bool);
canonical_default!(default_high_window, high_window, usize);
canonical_default!(default_near_high_ratio, near_high_ratio, f64);
canonical_default!(default_volume_recent, volume_recent, usize);
canonical_default!(default_volume_window, volume_window, usize);
canonical_default!(default_volume_increase_pct, volume_increase_pct, f64);
canonical_default!(default_rs_period, rs_period, usize);
canonical_default!(default_min_relative_strength, min_relative_strength, f64);
canonical_default!(default_min_institutional_value, min_institutional_value, Option<f64>);
canonical_default!(default_min_reputable_holders, min_reputable_holders, usize);
canonical_default!(default_market_fast, market_fast_window, usize);
canonical_default!(default_market_slow, market_slow_window, usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanslimParams {
    #[serde(default = "default_min_quarterly_growth")]
    pub min_quarterly_growth: f64,
    #[serde(default = "default_min_annual_growth")]
    pub min_annual_growth: f64,
    #[serde(default = "default_require_annual_growth")]
    pub require_annual_growth: bool,
    #[serde(default = "default_high_window")]
    pub high_window: usize,
    #[serde(default = "default_near_high_ratio")]
    pub near_high_ratio: f64,
    #[serde(default = "default_volume_recent")]
    pub volume_recent: usize,
    #[serde(default = "default_volume_window")]
    pub volume_window: usize,
    #[serde(default = "default_volume_increase_pct")]
    pub volume_increase_pct: f64,
    #[serde(default = "default_rs_period")]
    pub rs_period: usize,
    #[serde(default = "default_min_relative_strength")]
    pub min_relative_strength: f64,
    #[serde(default = "default_min_institutional_value")]
    pub min_institutional_value: Option<f64>,
    #[serde(default = "default_min_reputable_holders")]
    pub min_reputable_holders: usize,
    #[serde(default = "default_market_fast")]
    pub market_fast_window: usize,
    #[serde(default = "default_market_slow")]
    pub market_slow_window: usize,
}

impl CanslimParams {
    pub fn canonical() -> Self {
        Self {
            min_quarterly_growth: 25.0,
            min_annual_growth: 25.0,
            require_annual_growth: false,
            high_window: 252,
            near_high_ratio: 0.90,
            volume_recent: 20,
            volume_window: 50,
            volume_increase_pct: 15.0,
            rs_period: 120,
            min_relative_strength: 0.5,
            min_institutional_value: Some(1e9),
            min_reputable_holders: 2,
            market_fast_window: 50,
            market_slow_window: 200,
        }
    }

    pub fn legacy() -> Self {
        Self {
            require_annual_growth: true,
            near_high_ratio: 0.95,
            volume_increase_pct: 30.0,
            min_relative_strength: 1.0,
            min_institutional_value: None,
            min_reputable_holders: 3,
            ..Self::canonical()
        }
    }
}

impl Default for CanslimParams {
    fn default() -> Self {
        Self::canonical()
    }
}

// ── Fundamentals ─────────────────────────────────────────────────────────

/// Latest quarter vs the one before, in percent.
pub fn quarterly_growth(net_income: &[f64]) -> Option<f64> {
    match net_income {
        [latest, prior, ..] => safe_div(latest - prior, prior.abs()).map(|g| g * 100.0),
        _ => None,
    }
}

/// Sum of the latest four quarters vs the four before, in percent.
/// Needs eight quarters.
pub fn trailing_year_growth(net_income: &[f64]) -> Option<f64> {
    if net_income.len() < 8 {
        return None;
    }
    let latest: f64 = net_income[..4].iter().sum();
    let prior: f64 = net_income[4..8].iter().sum();
    safe_div(latest - prior, prior.abs()).map(|g| g * 100.0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sponsorship {
    pub total_value: f64,
    pub reputable: Vec<String>,
}

/// Total holding value and the distinct reputable managers among holders.
pub fn sponsorship(fundamentals: &Fundamentals) -> Sponsorship {
    let mut reputable = BTreeSet::new();
    let mut total_value = 0.0;
    for holder in &fundamentals.institutional_holders {
        if holder.value.is_finite() {
            total_value += holder.value;
        }
        let name = holder.name.to_lowercase();
        for rep in REPUTABLE_INSTITUTIONS {
            if name.contains(&rep.to_lowercase()) {
                reputable.insert(rep.to_string());
            }
        }
    }
    Sponsorship {
        total_value,
        reputable: reputable.into_iter().collect(),
    }
}

// ── Price / volume ───────────────────────────────────────────────────────

/// Percent increase of recent mean volume over the earlier part of the window.
pub fn volume_increase(volumes: &[f64], params: &CanslimParams) -> Option<f64> {
    if params.volume_recent >= params.volume_window || volumes.len() < params.volume_window {
        return None;
    }
    let window = &volumes[volumes.len() - params.volume_window..];
    let split = params.volume_window - params.volume_recent;
    let prior = mean(&window[..split])?;
    let recent = mean(&window[split..])?;
    safe_div(recent - prior, prior).map(|r| r * 100.0)
}

fn period_gain(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let start = closes[closes.len() - period];
    let end = closes[closes.len() - 1];
    safe_div(end, start).map(|r| r - 1.0)
}

/// Instrument gain over `rs_period` divided by the benchmark gain.
pub fn relative_strength(closes: &[f64], benchmark: &[f64], period: usize) -> Option<f64> {
    safe_div(period_gain(closes, period)?, period_gain(benchmark, period)?)
}

/// Market-direction gate on the benchmark.
pub fn market_in_uptrend(benchmark: &PriceSeries, params: &CanslimParams) -> bool {
    if benchmark.len() < params.market_slow_window {
        return false;
    }
    let closes = benchmark.closes();
    match (
        last(&calculate_sma(&closes, params.market_fast_window)),
        last(&calculate_sma(&closes, params.market_slow_window)),
    ) {
        (Some(fast), Some(slow)) => fast > slow,
        _ => false,
    }
}

// ── Evaluation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanslimMetrics {
    pub qtr_earnings_growth_pct: Option<f64>,
    pub yr_earnings_growth_pct: Option<f64>,
    pub near_52w_high: bool,
    pub volume_increase_pct: Option<f64>,
    pub volume_spike: bool,
    pub relative_strength: Option<f64>,
    pub inst_holders_value: f64,
    pub inst_reputable_count: usize,
    pub inst_reputable_names: Vec<String>,
}

impl CanslimMetrics {
    pub fn compute(
        series: &PriceSeries,
        fundamentals: &Fundamentals,
        benchmark: Option<&PriceSeries>,
        params: &CanslimParams,
    ) -> Self {
        let closes = series.closes();
        let near_52w_high = match (closes.last(), trailing_max(&closes, params.high_window)) {
            (Some(close), Some(high)) => *close >= params.near_high_ratio * high,
            _ => false,
        };
        let volume_increase_pct = volume_increase(&series.volumes(), params);
        let relative_strength =
            benchmark.and_then(|b| relative_strength(&closes, &b.closes(), params.rs_period));
        let holders = sponsorship(fundamentals);
        Self {
            qtr_earnings_growth_pct: quarterly_growth(&fundamentals.quarterly_net_income),
            yr_earnings_growth_pct: trailing_year_growth(&fundamentals.quarterly_net_income),
            near_52w_high,
            volume_increase_pct,
            volume_spike: volume_increase_pct.is_some_and(|v| v >= params.volume_increase_pct),
            relative_strength,
            inst_holders_value: holders.total_value,
            inst_reputable_count: holders.reputable.len(),
            inst_reputable_names: holders.reputable,
        }
    }

    pub fn passes(&self, params: &CanslimParams) -> bool {
        let quarterly = self
            .qtr_earnings_growth_pct
            .is_some_and(|q| q >= params.min_quarterly_growth);
        let annual = match self.yr_earnings_growth_pct {
            Some(y) => y >= params.min_annual_growth,
            None => !params.require_annual_growth,
        };
        let leader = self
            .relative_strength
            .is_some_and(|rs| rs >= params.min_relative_strength);
        let value_ok = params
            .min_institutional_value
            .map_or(true, |min| self.inst_holders_value >= min);
        let sponsored = value_ok && self.inst_reputable_count >= params.min_reputable_holders;

        quarterly && annual && self.near_52w_high && self.volume_spike && leader && sponsored
    }
}

pub fn evaluate(
    series: &PriceSeries,
    fundamentals: &Fundamentals,
    benchmark: Option<&PriceSeries>,
    params: &CanslimParams,
) -> Evaluation {
    let metrics = CanslimMetrics::compute(series, fundamentals, benchmark, params);
    let passed = metrics.passes(params);
    Evaluation::new(
        VerdictResult::from_pass(passed),
        Some(json!({
            "ticker": series.symbol(),
            "metrics": metrics,
        })),
    )
}
