// =============================================================================
// Golden Cross — SMA50 crossing above SMA200
// =============================================================================
//
// The cross indicator (fast > slow) only exists where both averages are
// defined; a cross is a bar where it is true and was false on the previous
// defined bar. The screen passes when the most recent cross lies within
// `recent_days` calendar days (inclusive) of the evaluated bar.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Evaluation;
use crate::indicators::{sma_key, IndicatorSet};
use crate::market_data::PriceSeries;
use crate::numeric::Series;
use crate::types::VerdictResult;

fn default_fast() -> usize {
    50
}
fn default_slow() -> usize {
    200
}
fn default_recent_days() -> i64 {
    7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenCrossParams {
    #[serde(default = "default_fast")]
    pub fast_window: usize,
    #[serde(default = "default_slow")]
    pub slow_window: usize,
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,
}

impl Default for GoldenCrossParams {
    fn default() -> Self {
        Self {
            fast_window: default_fast(),
            slow_window: default_slow(),
            recent_days: default_recent_days(),
        }
    }
}

/// Indices of every upward cross of `fast` over `slow`.
pub fn cross_indices(fast: &Series, slow: &Series) -> Vec<usize> {
    let mut crosses = Vec::new();
    let mut prev: Option<bool> = None;
    for (i, (f, s)) in fast.iter().zip(slow).enumerate() {
        let (Some(f), Some(s)) = (f, s) else {
            continue;
        };
        let above = f > s;
        if above && prev == Some(false) {
            crosses.push(i);
        }
        prev = Some(above);
    }
    crosses
}

pub fn evaluate(series: &PriceSeries, set: &IndicatorSet, params: &GoldenCrossParams) -> Evaluation {
    let (Some(fast), Some(slow), Some(latest)) = (
        set.get(&sma_key(params.fast_window)),
        set.get(&sma_key(params.slow_window)),
        series.last(),
    ) else {
        return Evaluation::new(VerdictResult::Fail, None);
    };

    let Some(&cross) = cross_indices(fast, slow).last() else {
        return Evaluation::new(VerdictResult::Fail, None);
    };
    let cross_at = series.bars()[cross].timestamp;
    let age = latest.timestamp - cross_at;
    let recent = age >= Duration::zero() && age <= Duration::days(params.recent_days);

    Evaluation::new(
        VerdictResult::from_pass(recent),
        Some(json!({ "cross_date": cross_at.date_naive().to_string() })),
    )
}
