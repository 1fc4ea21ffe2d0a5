// =============================================================================
// Sector Breadth — where money is moving, sector by sector
// =============================================================================
//
// Each member stock is classified by its last close-to-close move
// (advancing, declining or unchanged).  The batch is then folded into one
// verdict per sector:
//
//   adv_pct  = advancing / members evaluated
//   volume   = sum of the members' latest session volume
//   Leader         adv_pct > min_advancing_ratio and volume > median volume
//   StrongBreadth  adv_pct > min_advancing_ratio and volume <= median volume
//   Laggard        advancing < declining
//   Neutral        anything else
//
// The median is taken across the sectors that produced at least one member
// verdict.  Only leaders pass.
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Evaluation;
use crate::market_data::universe::normalise_symbols;
use crate::market_data::PriceSeries;
use crate::types::{ScreenKind, Verdict, VerdictResult};

fn default_min_advancing_ratio() -> f64 {
    0.6
}

fn default_sectors() -> BTreeMap<String, Vec<String>> {
    let sectors: [(&str, &[&str]); 11] = [
        ("Communication Services", &["GOOGL", "META", "NFLX", "DIS", "VZ"]),
        ("Consumer Discretionary", &["AMZN", "TSLA", "HD", "MCD", "NKE"]),
        ("Consumer Staples", &["PG", "KO", "PEP", "COST", "WMT"]),
        ("Energy", &["XOM", "CVX", "COP", "SLB", "EOG"]),
        ("Financials", &["JPM", "BAC", "WFC", "GS", "MS"]),
        ("Health Care", &["UNH", "JNJ", "LLY", "PFE", "MRK"]),
        ("Industrials", &["CAT", "GE", "HON", "UPS", "RTX"]),
        ("Information Technology", &["AAPL", "MSFT", "NVDA", "AVGO", "ORCL"]),
        ("Materials", &["LIN", "SHW", "APD", "FCX", "NEM"]),
        ("Real Estate", &["PLD", "AMT", "EQIX", "SPG", "O"]),
        ("Utilities", &["NEE", "DUK", "SO", "D", "AEP"]),
    ];
    sectors
        .iter()
        .map(|(name, members)| {
            (
                name.to_string(),
                members.iter().map(|m| m.to_string()).collect(),
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorBreadthParams {
    /// Sector name to member tickers.
    #[serde(default = "default_sectors")]
    pub sectors: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_min_advancing_ratio")]
    pub min_advancing_ratio: f64,
}

impl Default for SectorBreadthParams {
    fn default() -> Self {
        Self {
            sectors: default_sectors(),
            min_advancing_ratio: default_min_advancing_ratio(),
        }
    }
}

impl SectorBreadthParams {
    /// Every member ticker, normalised and de-duplicated.
    pub fn members(&self, unsupported: &[String]) -> Vec<String> {
        let all: Vec<String> = self.sectors.values().flatten().cloned().collect();
        normalise_symbols(&all, unsupported)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Advancing,
    Declining,
    Unchanged,
}

/// One member's latest move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemberMove {
    pub direction: Direction,
    pub volume: f64,
}

impl MemberMove {
    pub fn from_series(series: &PriceSeries) -> Option<Self> {
        let [.., prev, last] = series.bars() else {
            return None;
        };
        let direction = if last.close > prev.close {
            Direction::Advancing
        } else if last.close < prev.close {
            Direction::Declining
        } else {
            Direction::Unchanged
        };
        Some(Self {
            direction,
            volume: last.volume,
        })
    }
}

pub fn evaluate(series: &PriceSeries) -> Evaluation {
    match MemberMove::from_series(series) {
        Some(m) => Evaluation::new(
            VerdictResult::from_pass(m.direction == Direction::Advancing),
            serde_json::to_value(m).ok(),
        ),
        None => Evaluation::new(VerdictResult::Fail, None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorClass {
    Leader,
    StrongBreadth,
    Laggard,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorStats {
    pub sector: String,
    pub advancing: usize,
    pub declining: usize,
    pub unchanged: usize,
    pub total: usize,
    pub adv_pct: f64,
    pub volume: f64,
    pub class: SectorClass,
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Fold member verdicts into one verdict per sector, strongest breadth first.
pub fn aggregate(verdicts: Vec<Verdict>, params: &SectorBreadthParams) -> Vec<Verdict> {
    let moves: HashMap<String, (MemberMove, DateTime<Utc>)> = verdicts
        .into_iter()
        .filter_map(|v| {
            let m = serde_json::from_value::<MemberMove>(v.details?).ok()?;
            Some((v.instrument, (m, v.timestamp)))
        })
        .collect();

    let mut sectors: Vec<(SectorStats, DateTime<Utc>)> = Vec::new();
    for (name, members) in &params.sectors {
        let mut stats = SectorStats {
            sector: name.clone(),
            advancing: 0,
            declining: 0,
            unchanged: 0,
            total: 0,
            adv_pct: 0.0,
            volume: 0.0,
            class: SectorClass::Neutral,
        };
        let mut latest: Option<DateTime<Utc>> = None;
        for symbol in normalise_symbols(members, &[]) {
            let Some((m, ts)) = moves.get(&symbol) else {
                continue;
            };
            match m.direction {
                Direction::Advancing => stats.advancing += 1,
                Direction::Declining => stats.declining += 1,
                Direction::Unchanged => stats.unchanged += 1,
            }
            stats.total += 1;
            stats.volume += m.volume;
            latest = Some(latest.map_or(*ts, |l| l.max(*ts)));
        }
        if let Some(ts) = latest {
            stats.adv_pct = stats.advancing as f64 / stats.total as f64;
            sectors.push((stats, ts));
        }
    }

    let volumes: Vec<f64> = sectors.iter().map(|(s, _)| s.volume).collect();
    let median_volume = median(&volumes);
    for (s, _) in &mut sectors {
        let broad = s.adv_pct > params.min_advancing_ratio;
        s.class = if broad && s.volume > median_volume {
            SectorClass::Leader
        } else if broad {
            SectorClass::StrongBreadth
        } else if s.advancing < s.declining {
            SectorClass::Laggard
        } else {
            SectorClass::Neutral
        };
    }

    sectors.sort_by(|(a, _), (b, _)| {
        b.adv_pct
            .total_cmp(&a.adv_pct)
            .then(b.volume.total_cmp(&a.volume))
    });
    sectors
        .into_iter()
        .map(|(stats, timestamp)| Verdict {
            instrument: stats.sector.clone(),
            screen: ScreenKind::SectorBreadth,
            timestamp,
            result: VerdictResult::from_pass(stats.class == SectorClass::Leader),
            details: serde_json::to_value(&stats).ok(),
        })
        .collect()
}
