// =============================================================================
// Most Traded — buy/sell volume split over the latest session's minute bars
// =============================================================================
//
// Each minute bar's volume counts as buying when it closed above its open and
// as selling otherwise (an unchanged bar is selling).  Only bars sharing the
// last bar's UTC date count, so a multi-day intraday download still yields a
// single session.
//
// Per instrument the screen passes when any volume traded.  The batch is then
// ranked by total volume and only the top `top_n` keep their Pass.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::Evaluation;
use crate::market_data::PriceSeries;
use crate::numeric::safe_div;
use crate::types::{Verdict, VerdictResult};

fn default_top_n() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostTradedParams {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for MostTradedParams {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeSplit {
    pub total_volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub buy_pct: f64,
    pub sell_pct: f64,
}

impl VolumeSplit {
    fn new(buy_volume: f64, sell_volume: f64) -> Self {
        let total_volume = buy_volume + sell_volume;
        Self {
            total_volume,
            buy_volume,
            sell_volume,
            buy_pct: safe_div(buy_volume * 100.0, total_volume).unwrap_or(0.0),
            sell_pct: safe_div(sell_volume * 100.0, total_volume).unwrap_or(0.0),
        }
    }

    /// Split the bars of the series' last session.
    pub fn last_session(series: &PriceSeries) -> Option<Self> {
        let timestamps = series.timestamps();
        let session = timestamps.last()?.date_naive();
        let start = timestamps.iter().position(|t| t.date_naive() == session)?;

        let opens = series.opens();
        let closes = series.closes();
        let volumes = series.volumes();
        let (mut buy, mut sell) = (0.0, 0.0);
        for i in start..timestamps.len() {
            if closes[i] > opens[i] {
                buy += volumes[i];
            } else {
                sell += volumes[i];
            }
        }
        Some(Self::new(buy, sell))
    }
}

pub fn evaluate(series: &PriceSeries) -> Evaluation {
    match VolumeSplit::last_session(series) {
        Some(split) => Evaluation::new(
            VerdictResult::from_pass(split.total_volume > 0.0),
            serde_json::to_value(split).ok(),
        ),
        None => Evaluation::new(VerdictResult::Fail, None),
    }
}

fn total_volume(verdict: &Verdict) -> f64 {
    verdict
        .details
        .as_ref()
        .and_then(|d| serde_json::from_value::<VolumeSplit>(d.clone()).ok())
        .map(|s| s.total_volume)
        .unwrap_or(0.0)
}

/// Order by total volume, descending. Everything past `top_n` fails.
pub fn rank(mut verdicts: Vec<Verdict>, params: &MostTradedParams) -> Vec<Verdict> {
    verdicts.sort_by(|a, b| total_volume(b).total_cmp(&total_volume(a)));
    for (i, verdict) in verdicts.iter_mut().enumerate() {
        if i >= params.top_n {
            verdict.result = VerdictResult::Fail;
        }
    }
    verdicts
}
