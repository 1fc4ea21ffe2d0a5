// =============================================================================
// LEAP call entries on the option symbol (QQQ)
// =============================================================================
//
// Dip (signal 1): close down >= 1% vs prior close, close > SMA100 and
//                 close >= 0.8 * trailing 252-bar max close (not a bear market)
// Gap (signal 2): open >= 2% below prior close
//
// A pass carries the contract to open: 60-delta calls, 12-month expiry,
// 50% profit lock; 1 contract on a dip, 2 on a gap down.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Evaluation;
use crate::indicators::{sma_key, IndicatorSet};
use crate::market_data::PriceSeries;
use crate::numeric::{safe_div, trailing_max};
use crate::types::VerdictResult;

fn default_min_drop() -> f64 {
    0.01
}
fn default_min_gap() -> f64 {
    0.02
}
fn default_trend_window() -> usize {
    100
}
fn default_high_window() -> usize {
    252
}
fn default_bull_ratio() -> f64 {
    0.8
}
fn default_delta() -> f64 {
    0.60
}
fn default_expiry_months() -> u32 {
    12
}
fn default_profit_lock_pct() -> f64 {
    50.0
}
fn default_dip_contracts() -> u32 {
    1
}
fn default_gap_contracts() -> u32 {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeapParams {
    /// Minimum close-to-close drop as a fraction (0.01 = 1%).
    #[serde(default = "default_min_drop")]
    pub min_drop: f64,
    /// Minimum gap below the prior close as a fraction.
    #[serde(default = "default_min_gap")]
    pub min_gap: f64,
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    #[serde(default = "default_high_window")]
    pub high_window: usize,
    #[serde(default = "default_bull_ratio")]
    pub bull_ratio: f64,
    #[serde(default = "default_delta")]
    pub delta: f64,
    #[serde(default = "default_expiry_months")]
    pub expiry_months: u32,
    #[serde(default = "default_profit_lock_pct")]
    pub profit_lock_pct: f64,
    #[serde(default = "default_dip_contracts")]
    pub dip_contracts: u32,
    #[serde(default = "default_gap_contracts")]
    pub gap_contracts: u32,
}

impl Default for LeapParams {
    fn default() -> Self {
        Self {
            min_drop: default_min_drop(),
            min_gap: default_min_gap(),
            trend_window: default_trend_window(),
            high_window: default_high_window(),
            bull_ratio: default_bull_ratio(),
            delta: default_delta(),
            expiry_months: default_expiry_months(),
            profit_lock_pct: default_profit_lock_pct(),
            dip_contracts: default_dip_contracts(),
            gap_contracts: default_gap_contracts(),
        }
    }
}

/// Option order attached to a LEAP pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeapContract {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub delta: f64,
    pub expiration_months: u32,
    pub profit_lock_pct: f64,
    pub contracts: u32,
    pub date: String,
    pub note: String,
}

impl LeapContract {
    fn new(series: &PriceSeries, params: &LeapParams, contracts: u32) -> Self {
        let date = series
            .last()
            .map(|b| b.timestamp.date_naive().to_string())
            .unwrap_or_default();
        let calls = if contracts == 1 {
            "call option".to_string()
        } else {
            format!("{contracts}x call options")
        };
        Self {
            symbol: series.symbol().to_string(),
            kind: "LEAP Call".to_string(),
            delta: params.delta,
            expiration_months: params.expiry_months,
            profit_lock_pct: params.profit_lock_pct,
            contracts,
            date,
            note: format!(
                "Buy to open {} delta {calls}, {} months expiration, {}% profit lock.",
                (params.delta * 100.0).round(),
                params.expiry_months,
                params.profit_lock_pct
            ),
        }
    }

    fn into_details(self) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()
    }
}

fn prior_close(series: &PriceSeries) -> Option<f64> {
    let bars = series.bars();
    (bars.len() >= 2).then(|| bars[bars.len() - 2].close)
}

/// Signal 1: a down day inside an intact uptrend.
pub fn evaluate_dip(series: &PriceSeries, set: &IndicatorSet, params: &LeapParams) -> Evaluation {
    let (Some(bar), Some(prev)) = (series.last(), prior_close(series)) else {
        return Evaluation::new(VerdictResult::Fail, None);
    };
    let change = safe_div(bar.close - prev, prev);
    let dipped = change.is_some_and(|c| c <= -params.min_drop);
    let above_trend = set
        .latest(&sma_key(params.trend_window))
        .is_some_and(|sma| bar.close > sma);
    let bull = trailing_max(&series.closes(), params.high_window)
        .is_some_and(|high| bar.close >= params.bull_ratio * high);

    if dipped && above_trend && bull {
        let details = LeapContract::new(series, params, params.dip_contracts).into_details();
        Evaluation::new(VerdictResult::Pass, details)
    } else {
        Evaluation::new(
            VerdictResult::Fail,
            Some(json!({ "pct_change": change, "above_sma": above_trend, "bull_market": bull })),
        )
    }
}

/// Signal 2: a gap down at the open.
pub fn evaluate_gap(series: &PriceSeries, params: &LeapParams) -> Evaluation {
    let (Some(bar), Some(prev)) = (series.last(), prior_close(series)) else {
        return Evaluation::new(VerdictResult::Fail, None);
    };
    let gap = safe_div(bar.open - prev, prev);
    if gap.is_some_and(|g| g <= -params.min_gap) {
        let details = LeapContract::new(series, params, params.gap_contracts).into_details();
        Evaluation::new(VerdictResult::Pass, details)
    } else {
        Evaluation::new(VerdictResult::Fail, Some(json!({ "gap_pct": gap })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{compute_indicators, IndicatorConfig};
    use crate::market_data::bar::test_support::{bar_at, series_from_closes};

    fn with_last_close(mut closes: Vec<f64>, last: f64) -> PriceSeries {
        closes.push(last);
        series_from_closes("QQQ", &closes)
    }

    #[test]
    fn dip_in_uptrend_passes_with_one_contract() {
        let closes: Vec<f64> = (0..150).map(|i| 300.0 + i as f64).collect();
        // 449 -> 442: -1.56%
        let series = with_last_close(closes, 442.0);
        let set = compute_indicators(&series, &IndicatorConfig::default());
        let eval = evaluate_dip(&series, &set, &LeapParams::default());
        assert_eq!(eval.result, VerdictResult::Pass);
        let contract: LeapContract = serde_json::from_value(eval.details.unwrap()).unwrap();
        assert_eq!(contract.contracts, 1);
        assert_eq!(contract.delta, 0.60);
        assert_eq!(contract.expiration_months, 12);
        assert_eq!(contract.kind, "LEAP Call");
    }

    #[test]
    fn small_dip_or_broken_trend_fails() {
        let closes: Vec<f64> = (0..150).map(|i| 300.0 + i as f64).collect();
        let series = with_last_close(closes.clone(), 447.0);
        let set = compute_indicators(&series, &IndicatorConfig::default());
        assert_eq!(evaluate_dip(&series, &set, &LeapParams::default()).result, VerdictResult::Fail);

        // A crash far below the 100-bar average and the 52-week high.
        let series = with_last_close(closes, 300.0);
        let set = compute_indicators(&series, &IndicatorConfig::default());
        assert_eq!(evaluate_dip(&series, &set, &LeapParams::default()).result, VerdictResult::Fail);
    }

    #[test]
    fn gap_down_passes_with_two_contracts() {
        let bars = vec![
            bar_at(0, 100.0, 100.0, 101.0, 99.0, 1e6),
            bar_at(1, 97.5, 98.0, 98.5, 97.0, 1e6),
        ];
        let series = PriceSeries::new("QQQ", bars).unwrap();
        let eval = evaluate_gap(&series, &LeapParams::default());
        assert_eq!(eval.result, VerdictResult::Pass);
        assert_eq!(eval.details.unwrap()["contracts"], 2);

        let bars = vec![
            bar_at(0, 100.0, 100.0, 101.0, 99.0, 1e6),
            bar_at(1, 98.5, 98.0, 99.0, 97.0, 1e6),
        ];
        let series = PriceSeries::new("QQQ", bars).unwrap();
        assert_eq!(evaluate_gap(&series, &LeapParams::default()).result, VerdictResult::Fail);
    }

    #[test]
    fn single_bar_fails() {
        let series = series_from_closes("QQQ", &[100.0]);
        assert_eq!(evaluate_gap(&series, &LeapParams::default()).result, VerdictResult::Fail);
    }
}
