// =============================================================================
// Stage 2 Trend Template
// =============================================================================
//
// Eight gates evaluated in order on the latest bar; the first failing gate
// decides the verdict:
//
//   1. close > SMA150 and close > SMA200
//   2. SMA150 > SMA200
//   3. SMA200 rising (today vs the fifth-most-recent bar)
//   4. SMA50 > SMA150 and SMA50 > SMA200
//   5. close > SMA50
//   6. close >= 1.30 * 52-week low close
//   7. close >= 0.75 * 52-week high close
//   8. simple RSI >= 70
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Evaluation;
use crate::indicators::{rsi_key, sma_key, IndicatorConfig, IndicatorSet, RsiMethod};
use crate::market_data::PriceSeries;
use crate::numeric::{trailing_max, trailing_min};
use crate::types::VerdictResult;

pub const GATE_COUNT: usize = 8;

fn default_fast() -> usize {
    50
}
fn default_mid() -> usize {
    150
}
fn default_slow() -> usize {
    200
}
fn default_slope_offset() -> usize {
    4
}
fn default_year_window() -> usize {
    252
}
fn default_above_low_ratio() -> f64 {
    1.30
}
fn default_near_high_ratio() -> f64 {
    0.75
}
fn default_min_rsi() -> f64 {
    70.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Params {
    #[serde(default = "default_fast")]
    pub fast_window: usize,
    #[serde(default = "default_mid")]
    pub mid_window: usize,
    #[serde(default = "default_slow")]
    pub slow_window: usize,
    /// Bars back for the rising-SMA200 comparison (4 = fifth-most-recent).
    #[serde(default = "default_slope_offset")]
    pub slope_offset: usize,
    #[serde(default = "default_year_window")]
    pub year_window: usize,
    #[serde(default = "default_above_low_ratio")]
    pub above_low_ratio: f64,
    #[serde(default = "default_near_high_ratio")]
    pub near_high_ratio: f64,
    #[serde(default = "default_min_rsi")]
    pub min_rsi: f64,
}

impl Default for Stage2Params {
    fn default() -> Self {
        Self {
            fast_window: default_fast(),
            mid_window: default_mid(),
            slow_window: default_slow(),
            slope_offset: default_slope_offset(),
            year_window: default_year_window(),
            above_low_ratio: default_above_low_ratio(),
            near_high_ratio: default_near_high_ratio(),
            min_rsi: default_min_rsi(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage2Snapshot {
    pub close: f64,
    pub sma_fast: Option<f64>,
    pub sma_mid: Option<f64>,
    pub sma_slow: Option<f64>,
    pub sma_slow_prior: Option<f64>,
    pub year_low: Option<f64>,
    pub year_high: Option<f64>,
    pub rsi: Option<f64>,
}

impl Stage2Snapshot {
    pub fn from_indicators(
        series: &PriceSeries,
        set: &IndicatorSet,
        config: &IndicatorConfig,
        params: &Stage2Params,
    ) -> Option<Self> {
        let close = series.last()?.close;
        let closes = series.closes();
        let slow = sma_key(params.slow_window);
        Some(Self {
            close,
            sma_fast: set.latest(&sma_key(params.fast_window)),
            sma_mid: set.latest(&sma_key(params.mid_window)),
            sma_slow: set.latest(&slow),
            sma_slow_prior: set.back(&slow, params.slope_offset),
            year_low: trailing_min(&closes, params.year_window),
            year_high: trailing_max(&closes, params.year_window),
            rsi: set.latest(&rsi_key(config.rsi_window, RsiMethod::Simple)),
        })
    }

    /// Outcome of gate `n` (1-based); undefined inputs fail the gate.
    pub fn gate(&self, n: usize, params: &Stage2Params) -> bool {
        let c = self.close;
        let check = || -> Option<bool> {
            Some(match n {
                1 => c > self.sma_mid? && c > self.sma_slow?,
                2 => self.sma_mid? > self.sma_slow?,
                3 => self.sma_slow? > self.sma_slow_prior?,
                4 => {
                    let fast = self.sma_fast?;
                    fast > self.sma_mid? && fast > self.sma_slow?
                }
                5 => c > self.sma_fast?,
                6 => c >= params.above_low_ratio * self.year_low?,
                7 => c >= params.near_high_ratio * self.year_high?,
                8 => self.rsi? >= params.min_rsi,
                _ => false,
            })
        };
        check().unwrap_or(false)
    }

    /// First failing gate, or `None` when all eight pass.
    pub fn first_failing_gate(&self, params: &Stage2Params) -> Option<usize> {
        (1..=GATE_COUNT).find(|&n| !self.gate(n, params))
    }
}

pub fn evaluate(
    series: &PriceSeries,
    set: &IndicatorSet,
    config: &IndicatorConfig,
    params: &Stage2Params,
) -> Evaluation {
    let Some(snap) = Stage2Snapshot::from_indicators(series, set, config, params) else {
        return Evaluation::new(VerdictResult::Fail, None);
    };
    let failed = snap.first_failing_gate(params);
    Evaluation::new(
        VerdictResult::from_pass(failed.is_none()),
        Some(json!({
            "close": snap.close,
            "failed_gate": failed,
        })),
    )
}
