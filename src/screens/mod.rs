// =============================================================================
// Screen Evaluator
// =============================================================================
//
// Each screen is a pure function of (price series, indicator set, params)
// evaluated on the latest bar.  CANSLIM additionally reads fundamentals and
// the benchmark series.  Undefined inputs always resolve to Fail / Hold.
//
// `ScreenParams` holds every screen's parameters; variants of the same idea
// (CANSLIM canonical vs legacy, Bora trend methods) are parameter presets
// rather than separate screens.
//
// Most Traded and Sector Breadth only make sense across a batch: `finalize`
// ranks or folds the per-instrument verdicts once every instrument is in.
// =============================================================================

pub mod bora;
pub mod buy_sell;
pub mod canslim;
pub mod golden_cross;
pub mod leap;
pub mod most_traded;
pub mod sector_breadth;
pub mod stage2;
pub mod trending;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicators::{IndicatorConfig, IndicatorSet};
use crate::market_data::{Fundamentals, PriceSeries};
use crate::types::{ScreenKind, SkipReason, Verdict, VerdictResult};

pub use bora::{BoraParams, TrendMethod};
pub use buy_sell::BuySellParams;
pub use canslim::{CanslimParams, CanslimPreset};
pub use golden_cross::GoldenCrossParams;
pub use leap::LeapParams;
pub use most_traded::MostTradedParams;
pub use sector_breadth::SectorBreadthParams;
pub use stage2::Stage2Params;
pub use trending::TrendingParams;

/// Result of one screen on one instrument, before it is stamped as a Verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: VerdictResult,
    pub details: Option<serde_json::Value>,
}

impl Evaluation {
    pub fn new(result: VerdictResult, details: Option<serde_json::Value>) -> Self {
        Self { result, details }
    }

    pub fn into_verdict(
        self,
        instrument: impl Into<String>,
        screen: ScreenKind,
        timestamp: DateTime<Utc>,
    ) -> Verdict {
        Verdict {
            instrument: instrument.into(),
            screen,
            timestamp,
            result: self.result,
            details: self.details,
        }
    }
}

/// Parameters of every screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenParams {
    #[serde(default)]
    pub buy_sell: BuySellParams,
    #[serde(default)]
    pub stage2: Stage2Params,
    #[serde(default)]
    pub golden_cross: GoldenCrossParams,
    #[serde(default)]
    pub bora: BoraParams,
    #[serde(default)]
    pub canslim: CanslimParams,
    #[serde(default)]
    pub leap: LeapParams,
    #[serde(default)]
    pub trending: TrendingParams,
    #[serde(default)]
    pub most_traded: MostTradedParams,
    #[serde(default)]
    pub sector_breadth: SectorBreadthParams,
}

fn ensure_finite(values: &[(&str, f64)]) -> Result<()> {
    if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
        bail!("{name} must be a finite number, got {value}");
    }
    Ok(())
}

impl ScreenParams {
    pub fn validate(&self) -> Result<()> {
        let (b, s, c, l) = (&self.buy_sell, &self.stage2, &self.canslim, &self.leap);
        ensure_finite(&[
            ("buy_sell.max_proximity", b.max_proximity),
            ("buy_sell.volatility_multiplier", b.volatility_multiplier),
            ("buy_sell.volume_multiplier", b.volume_multiplier),
            ("buy_sell.rsi_oversold", b.rsi_oversold),
            ("buy_sell.rsi_overbought", b.rsi_overbought),
            ("buy_sell.stoch_oversold", b.stoch_oversold),
            ("buy_sell.stoch_overbought", b.stoch_overbought),
            ("stage2.above_low_ratio", s.above_low_ratio),
            ("stage2.near_high_ratio", s.near_high_ratio),
            ("stage2.min_rsi", s.min_rsi),
            ("bora.slope_thresh", self.bora.slope_thresh),
            ("bora.pct_thresh", self.bora.pct_thresh),
            ("canslim.min_quarterly_growth", c.min_quarterly_growth),
            ("canslim.min_annual_growth", c.min_annual_growth),
            ("canslim.near_high_ratio", c.near_high_ratio),
            ("canslim.volume_increase_pct", c.volume_increase_pct),
            ("canslim.min_relative_strength", c.min_relative_strength),
            (
                "canslim.min_institutional_value",
                c.min_institutional_value.unwrap_or(0.0),
            ),
            ("leap.min_drop", l.min_drop),
            ("leap.min_gap", l.min_gap),
            ("leap.bull_ratio", l.bull_ratio),
            ("leap.delta", l.delta),
            ("leap.profit_lock_pct", l.profit_lock_pct),
            ("trending.min_volume", self.trending.min_volume),
            ("trending.min_change_pct", self.trending.min_change_pct),
            (
                "sector_breadth.min_advancing_ratio",
                self.sector_breadth.min_advancing_ratio,
            ),
        ])?;

        if b.volatility_window < 2 {
            bail!("buy_sell.volatility_window must be at least 2");
        }
        if b.max_proximity < 0.0 || b.volume_multiplier < 0.0 {
            bail!("buy_sell proximity and volume multiplier must not be negative");
        }
        if self.golden_cross.fast_window == 0
            || self.golden_cross.fast_window >= self.golden_cross.slow_window
        {
            bail!("golden_cross.fast_window must be positive and below slow_window");
        }
        if self.golden_cross.recent_days < 0 {
            bail!("golden_cross.recent_days must not be negative");
        }
        if self.bora.lookback < 2 {
            bail!("bora.lookback must be at least 2, got {}", self.bora.lookback);
        }
        if s.fast_window == 0 || s.mid_window == 0 || s.slow_window == 0 || s.year_window == 0 {
            bail!("stage2 windows must be positive");
        }
        if c.volume_recent == 0 || c.volume_recent >= c.volume_window {
            bail!("canslim.volume_recent must be positive and below volume_window");
        }
        if c.rs_period < 2 || c.high_window == 0 || c.market_fast_window >= c.market_slow_window {
            bail!("canslim windows are inconsistent");
        }
        if self.leap.trend_window == 0 || self.leap.high_window == 0 {
            bail!("leap windows must be positive");
        }
        if self.most_traded.top_n == 0 {
            bail!("most_traded.top_n must be positive");
        }
        if self.sector_breadth.sectors.is_empty() {
            bail!("sector_breadth.sectors must name at least one sector");
        }
        Ok(())
    }

    /// Indicator configuration a screen needs: the base set plus any
    /// averages its own parameters name.
    pub fn indicator_config(&self, kind: ScreenKind, base: &IndicatorConfig) -> IndicatorConfig {
        let mut config = base.clone();
        match kind {
            ScreenKind::BuySell => {
                config.require_sma(self.buy_sell.trend_window);
            }
            ScreenKind::Stage2 => {
                config
                    .require_sma(self.stage2.fast_window)
                    .require_sma(self.stage2.mid_window)
                    .require_sma(self.stage2.slow_window);
            }
            ScreenKind::GoldenCross => {
                config
                    .require_sma(self.golden_cross.fast_window)
                    .require_sma(self.golden_cross.slow_window);
            }
            ScreenKind::Bora => {
                config
                    .require_sma(self.bora.trend_window)
                    .require_ema(self.bora.fast_span)
                    .require_ema(self.bora.slow_span);
            }
            ScreenKind::LeapDip => {
                config.require_sma(self.leap.trend_window);
            }
            ScreenKind::Canslim
            | ScreenKind::LeapGapDown
            | ScreenKind::Trending
            | ScreenKind::MostTraded
            | ScreenKind::SectorBreadth => {}
        }
        config
    }

    /// Minimum bars an instrument needs before the screen is attempted.
    pub fn min_bars(&self, kind: ScreenKind) -> usize {
        match kind {
            ScreenKind::BuySell => self.buy_sell.volatility_window + 1,
            ScreenKind::Stage2 => self.stage2.slow_window,
            ScreenKind::GoldenCross => self.golden_cross.slow_window + 1,
            ScreenKind::Bora => self.bora.trend_window.max(self.bora.lookback),
            ScreenKind::Canslim => self.canslim.market_slow_window,
            ScreenKind::LeapDip => self.leap.trend_window,
            ScreenKind::LeapGapDown | ScreenKind::Trending | ScreenKind::SectorBreadth => 2,
            ScreenKind::MostTraded => 1,
        }
    }
}

/// Everything a screen may read for one instrument.
#[derive(Debug, Clone, Copy)]
pub struct ScreenInput<'a> {
    pub series: &'a PriceSeries,
    pub indicators: &'a IndicatorSet,
    pub fundamentals: Option<&'a Fundamentals>,
    pub benchmark: Option<&'a PriceSeries>,
}

/// Run `kind` over one instrument.
pub fn evaluate(
    kind: ScreenKind,
    params: &ScreenParams,
    config: &IndicatorConfig,
    input: ScreenInput<'_>,
) -> Result<Evaluation, SkipReason> {
    let ScreenInput {
        series,
        indicators: set,
        ..
    } = input;

    if series.is_empty() {
        return Err(SkipReason::NoData);
    }
    let need = params.min_bars(kind);
    if series.len() < need {
        return Err(SkipReason::InsufficientHistory {
            have: series.len(),
            need,
        });
    }

    Ok(match kind {
        ScreenKind::BuySell => buy_sell::evaluate(series, set, config, &params.buy_sell),
        ScreenKind::Stage2 => stage2::evaluate(series, set, config, &params.stage2),
        ScreenKind::GoldenCross => golden_cross::evaluate(series, set, &params.golden_cross),
        ScreenKind::Bora => bora::evaluate(series, set, &params.bora),
        ScreenKind::Canslim => {
            let fundamentals = input.fundamentals.ok_or_else(|| SkipReason::MissingFundamentals {
                message: format!("no fundamentals for {}", series.symbol()),
            })?;
            canslim::evaluate(series, fundamentals, input.benchmark, &params.canslim)
        }
        ScreenKind::LeapDip => leap::evaluate_dip(series, set, &params.leap),
        ScreenKind::LeapGapDown => leap::evaluate_gap(series, &params.leap),
        ScreenKind::Trending => trending::evaluate(series, &params.trending),
        ScreenKind::MostTraded => most_traded::evaluate(series),
        ScreenKind::SectorBreadth => sector_breadth::evaluate(series),
    })
}

/// Batch-level pass over the collected verdicts.
pub fn finalize(kind: ScreenKind, params: &ScreenParams, verdicts: Vec<Verdict>) -> Vec<Verdict> {
    match kind {
        ScreenKind::Trending => trending::rank(verdicts),
        ScreenKind::MostTraded => most_traded::rank(verdicts, &params.most_traded),
        ScreenKind::SectorBreadth => sector_breadth::aggregate(verdicts, &params.sector_breadth),
        _ => verdicts,
    }
}
