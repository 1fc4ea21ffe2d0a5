// =============================================================================
// Shared types used across the screener
// =============================================================================

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Buy / Sell / Hold classification produced by the Buy/Sell signal screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
            Self::Hold => write!(f, "Hold"),
        }
    }
}

/// Every named screen the evaluator knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenKind {
    BuySell,
    Stage2,
    GoldenCross,
    Bora,
    Canslim,
    LeapDip,
    LeapGapDown,
    Trending,
    MostTraded,
    SectorBreadth,
}

impl ScreenKind {
    pub const ALL: [ScreenKind; 10] = [
        Self::BuySell,
        Self::Stage2,
        Self::GoldenCross,
        Self::Bora,
        Self::Canslim,
        Self::LeapDip,
        Self::LeapGapDown,
        Self::Trending,
        Self::MostTraded,
        Self::SectorBreadth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuySell => "buy_sell",
            Self::Stage2 => "stage2",
            Self::GoldenCross => "golden_cross",
            Self::Bora => "bora",
            Self::Canslim => "canslim",
            Self::LeapDip => "leap_option_qqq",
            Self::LeapGapDown => "leap_option_qqq_gap",
            Self::Trending => "trending",
            Self::MostTraded => "most_traded",
            Self::SectorBreadth => "sector_breadth",
        }
    }

    /// LEAP screens run against the configured option underlying rather than
    /// the equity universe.
    pub fn is_option_strategy(&self) -> bool {
        matches!(self, Self::LeapDip | Self::LeapGapDown)
    }

    /// Screens evaluated on the latest session's minute bars instead of
    /// daily history.
    pub fn uses_intraday_bars(&self) -> bool {
        matches!(self, Self::MostTraded)
    }
}

impl std::fmt::Display for ScreenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScreenKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalised)
            .or(match normalised.as_str() {
                "stage_2" => Some(Self::Stage2),
                "leap_dip" => Some(Self::LeapDip),
                "leap_gap" | "leap_gap_down" => Some(Self::LeapGapDown),
                "trending_stocks" => Some(Self::Trending),
                "most_traded_stocks" => Some(Self::MostTraded),
                "follow_the_money" => Some(Self::SectorBreadth),
                _ => None,
            })
            .ok_or_else(|| anyhow::anyhow!("unknown screen '{s}'"))
    }
}

/// Outcome of one screen for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum VerdictResult {
    Signal(SignalAction),
    Pass,
    Fail,
}

impl VerdictResult {
    /// Whether the verdict is worth reporting (a Buy/Sell or a screen pass).
    pub fn is_hit(&self) -> bool {
        match self {
            Self::Signal(action) => *action != SignalAction::Hold,
            Self::Pass => true,
            Self::Fail => false,
        }
    }

    pub fn from_pass(passed: bool) -> Self {
        if passed {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

/// Durable artifact of a screening run for a single instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub instrument: String,
    pub screen: ScreenKind,
    pub timestamp: DateTime<Utc>,
    pub result: VerdictResult,
    /// Metrics that produced the verdict (screen specific).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Why an instrument produced no verdict in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("fetch failed: {message}")]
    FetchFailed { message: String },
    #[error("provider returned no data")]
    NoData,
    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },
    #[error("fundamentals unavailable: {message}")]
    MissingFundamentals { message: String },
    #[error("task failed: {message}")]
    TaskFailed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_kind_parses_aliases() {
        assert_eq!("stage2".parse::<ScreenKind>().unwrap(), ScreenKind::Stage2);
        assert_eq!("stage_2".parse::<ScreenKind>().unwrap(), ScreenKind::Stage2);
        assert_eq!("Golden-Cross".parse::<ScreenKind>().unwrap(), ScreenKind::GoldenCross);
        assert_eq!(
            "leap_option_qqq_gap".parse::<ScreenKind>().unwrap(),
            ScreenKind::LeapGapDown
        );
        assert_eq!(
            "follow-the-money".parse::<ScreenKind>().unwrap(),
            ScreenKind::SectorBreadth
        );
        assert_eq!("most_traded".parse::<ScreenKind>().unwrap(), ScreenKind::MostTraded);
        assert!("momentum".parse::<ScreenKind>().is_err());
    }

    #[test]
    fn hold_and_fail_are_not_hits() {
        assert!(!VerdictResult::Signal(SignalAction::Hold).is_hit());
        assert!(!VerdictResult::Fail.is_hit());
        assert!(VerdictResult::Signal(SignalAction::Sell).is_hit());
        assert!(VerdictResult::Pass.is_hit());
    }

    #[test]
    fn skip_reason_serialises_with_tag() {
        let reason = SkipReason::InsufficientHistory { have: 12, need: 200 };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["reason"], "insufficient_history");
        assert_eq!(json["need"], 200);
        assert_eq!(reason.to_string(), "insufficient history: have 12 bars, need 200");
    }
}
