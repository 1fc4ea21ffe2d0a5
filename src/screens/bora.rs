// =============================================================================
// Bora Trend — price above SMA200, EMA21 above EMA50, EMA21 rising
// =============================================================================
//
// "Rising" is judged over the last `lookback` EMA21 values by one of:
//   Slope   least-squares slope > slope_thresh
//   Pct     (last / first - 1) * 100 > pct_thresh
//   Strict  every value above the previous one

use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Evaluation;
use crate::indicators::{ema_key, sma_key, IndicatorSet};
use crate::market_data::PriceSeries;
use crate::numeric::{linear_slope, safe_div};
use crate::types::VerdictResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMethod {
    #[default]
    Slope,
    Pct,
    Strict,
}

impl FromStr for TrendMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "slope" => Ok(Self::Slope),
            "pct" | "percent" => Ok(Self::Pct),
            "strict" => Ok(Self::Strict),
            other => bail!("unknown trend method '{other}' (expected slope, pct or strict)"),
        }
    }
}

fn default_lookback() -> usize {
    10
}
fn default_pct_thresh() -> f64 {
    1.0
}
fn default_trend_window() -> usize {
    200
}
fn default_fast_span() -> usize {
    21
}
fn default_slow_span() -> usize {
    50
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoraParams {
    #[serde(default)]
    pub method: TrendMethod,
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default)]
    pub slope_thresh: f64,
    #[serde(default = "default_pct_thresh")]
    pub pct_thresh: f64,
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    #[serde(default = "default_fast_span")]
    pub fast_span: usize,
    #[serde(default = "default_slow_span")]
    pub slow_span: usize,
}

impl Default for BoraParams {
    fn default() -> Self {
        Self {
            method: TrendMethod::default(),
            lookback: default_lookback(),
            slope_thresh: 0.0,
            pct_thresh: default_pct_thresh(),
            trend_window: default_trend_window(),
            fast_span: default_fast_span(),
            slow_span: default_slow_span(),
        }
    }
}

/// Whether the trailing `lookback` values trend up under `params.method`.
/// Fewer than `lookback` defined values never trend.
pub fn trending_up(values: &[f64], params: &BoraParams) -> bool {
    if params.lookback < 2 || values.len() < params.lookback {
        return false;
    }
    let recent = &values[values.len() - params.lookback..];
    match params.method {
        TrendMethod::Slope => linear_slope(recent).is_some_and(|s| s > params.slope_thresh),
        TrendMethod::Pct => {
            let first = recent[0];
            let last = recent[recent.len() - 1];
            safe_div(last, first).is_some_and(|r| (r - 1.0) * 100.0 > params.pct_thresh)
        }
        TrendMethod::Strict => recent.windows(2).all(|w| w[0] < w[1]),
    }
}

pub fn evaluate(series: &PriceSeries, set: &IndicatorSet, params: &BoraParams) -> Evaluation {
    let Some(bar) = series.last() else {
        return Evaluation::new(VerdictResult::Fail, None);
    };
    let close = bar.close;
    let fast_key = ema_key(params.fast_span);

    let above_trend = set
        .latest(&sma_key(params.trend_window))
        .is_some_and(|sma| close > sma);
    let aligned = match (set.latest(&fast_key), set.latest(&ema_key(params.slow_span))) {
        (Some(fast), Some(slow)) => fast > slow,
        _ => false,
    };
    let rising = set.get(&fast_key).is_some_and(|ema| {
        let defined: Vec<f64> = ema.iter().flatten().copied().collect();
        trending_up(&defined, params)
    });

    Evaluation::new(
        VerdictResult::from_pass(above_trend && aligned && rising),
        Some(json!({
            "close": close,
            "method": params.method,
            "above_sma": above_trend,
            "ema_aligned": aligned,
            "ema_rising": rising,
        })),
    )
}
