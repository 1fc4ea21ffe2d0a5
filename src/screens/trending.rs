// =============================================================================
// Trending — heavy volume and a large one-day move
// =============================================================================
//
// Pass when the latest session traded more than `min_volume` shares and the
// close moved more than `min_change_pct` percent (either direction) from the
// prior close.  Both thresholds are strict.  Batch results are ordered by
// percent change, largest gain first.

use serde::{Deserialize, Serialize};

use super::Evaluation;
use crate::market_data::PriceSeries;
use crate::numeric::safe_div;
use crate::types::{Verdict, VerdictResult};

fn default_min_volume() -> f64 {
    1_000_000.0
}
fn default_min_change_pct() -> f64 {
    2.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingParams {
    #[serde(default = "default_min_volume")]
    pub min_volume: f64,
    /// Percent, not a fraction (2.0 = 2%).
    #[serde(default = "default_min_change_pct")]
    pub min_change_pct: f64,
}

impl Default for TrendingParams {
    fn default() -> Self {
        Self {
            min_volume: default_min_volume(),
            min_change_pct: default_min_change_pct(),
        }
    }
}

/// Latest session volume and close-to-close percent change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyMove {
    pub volume: f64,
    pub change_pct: f64,
}

impl DailyMove {
    pub fn from_series(series: &PriceSeries) -> Option<Self> {
        let bars = series.bars();
        let [.., prev, last] = bars else {
            return None;
        };
        Some(Self {
            volume: last.volume,
            change_pct: safe_div((last.close - prev.close) * 100.0, prev.close)?,
        })
    }

    pub fn is_trending(&self, params: &TrendingParams) -> bool {
        self.volume > params.min_volume && self.change_pct.abs() > params.min_change_pct
    }
}

pub fn evaluate(series: &PriceSeries, params: &TrendingParams) -> Evaluation {
    match DailyMove::from_series(series) {
        Some(m) => Evaluation::new(
            VerdictResult::from_pass(m.is_trending(params)),
            serde_json::to_value(m).ok(),
        ),
        None => Evaluation::new(VerdictResult::Fail, None),
    }
}

/// Sort by percent change, descending. Verdicts without a move go last.
pub fn rank(mut verdicts: Vec<Verdict>) -> Vec<Verdict> {
    let change = |v: &Verdict| {
        v.details
            .as_ref()
            .and_then(|d| serde_json::from_value::<DailyMove>(d.clone()).ok())
            .map(|m| m.change_pct)
            .unwrap_or(f64::NEG_INFINITY)
    };
    verdicts.sort_by(|a, b| change(b).total_cmp(&change(a)));
    verdicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::bar::test_support::bar_at;
    use crate::types::ScreenKind;
    use chrono::Utc;

    fn two_days(prev: f64, last: f64, volume: f64) -> PriceSeries {
        PriceSeries::new(
            "NVDA",
            vec![
                bar_at(0, prev, prev, prev, prev, 5e6),
                bar_at(1, last, last, last, last, volume),
            ],
        )
        .unwrap()
    }

    fn result(series: &PriceSeries) -> VerdictResult {
        evaluate(series, &TrendingParams::default()).result
    }

    #[test]
    fn thresholds_are_strict() {
        // Exactly 2% and exactly 1M shares do not qualify.
        assert_eq!(result(&two_days(100.0, 102.0, 2e6)), VerdictResult::Fail);
        assert_eq!(result(&two_days(100.0, 102.5, 1_000_000.0)), VerdictResult::Fail);

        assert_eq!(result(&two_days(100.0, 102.5, 1_000_001.0)), VerdictResult::Pass);
        assert_eq!(result(&two_days(100.0, 102.01, 2e6)), VerdictResult::Pass);
    }

    #[test]
    fn large_drops_trend_too() {
        assert_eq!(result(&two_days(100.0, 97.5, 2e6)), VerdictResult::Pass);
        assert_eq!(result(&two_days(100.0, 98.0, 2e6)), VerdictResult::Fail);
    }

    #[test]
    fn details_carry_the_move() {
        let e = evaluate(&two_days(50.0, 53.0, 3e6), &TrendingParams::default());
        let details = e.details.unwrap();
        assert_eq!(details["volume"], 3e6);
        assert!((details["change_pct"].as_f64().unwrap() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn single_bar_or_zero_base_fails() {
        let one = PriceSeries::new("X", vec![bar_at(0, 10.0, 10.0, 10.0, 10.0, 5e6)]).unwrap();
        assert_eq!(result(&one), VerdictResult::Fail);
        assert_eq!(result(&two_days(0.0, 5.0, 5e6)), VerdictResult::Fail);
    }

    #[test]
    fn rank_orders_by_change() {
        let verdict = |name: &str, prev: f64, last: f64| {
            evaluate(&two_days(prev, last, 2e6), &TrendingParams::default()).into_verdict(
                name,
                ScreenKind::Trending,
                Utc::now(),
            )
        };
        let ranked = rank(vec![
            verdict("DOWN", 100.0, 95.0),
            verdict("UP", 100.0, 104.0),
            verdict("FLAT", 100.0, 100.0),
        ]);
        let names: Vec<_> = ranked.iter().map(|v| v.instrument.as_str()).collect();
        assert_eq!(names, vec!["UP", "FLAT", "DOWN"]);
    }
}
