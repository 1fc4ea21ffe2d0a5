// =============================================================================
// Buy / Sell Signal — Bollinger + RSI + Stochastic + PSAR + MACD confluence
// =============================================================================
//
// Evaluated on the latest bar only.
//
//   proximity = min(max_proximity, k * sample_std(pct_change(close), 10))
//
//   Volume gate (both sides): volume >= 1.2 * VOLUME_SMA, else Hold.
//
//   BUY : close <= BB_lower * (1 + proximity)
//         RSI > 30, %K < 20, close > PSAR, close >= SMA_200
//   SELL: close >= BB_upper * (1 - proximity)
//         RSI < 70, (MACD < signal) or (%K > 80 and close < PSAR)
//
// Any undefined input used by a branch makes that branch fail.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Evaluation;
use crate::indicators::{self, IndicatorConfig, IndicatorSet, RsiMethod};
use crate::market_data::PriceSeries;
use crate::numeric::{last, pct_change, rolling_defined, sample_std};
use crate::types::{SignalAction, VerdictResult};

fn default_rsi_method() -> RsiMethod {
    RsiMethod::Wilder
}
fn default_max_proximity() -> f64 {
    0.02
}
fn default_volatility_window() -> usize {
    10
}
fn default_volatility_multiplier() -> f64 {
    1.5
}
fn default_volume_multiplier() -> f64 {
    1.2
}
fn default_rsi_oversold() -> f64 {
    30.0
}
fn default_rsi_overbought() -> f64 {
    70.0
}
fn default_stoch_oversold() -> f64 {
    20.0
}
fn default_stoch_overbought() -> f64 {
    80.0
}
fn default_trend_window() -> usize {
    200
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuySellParams {
    #[serde(default = "default_rsi_method")]
    pub rsi_method: RsiMethod,
    #[serde(default = "default_max_proximity")]
    pub max_proximity: f64,
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,
    #[serde(default = "default_volatility_multiplier")]
    pub volatility_multiplier: f64,
    #[serde(default = "default_volume_multiplier")]
    pub volume_multiplier: f64,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_stoch_oversold")]
    pub stoch_oversold: f64,
    #[serde(default = "default_stoch_overbought")]
    pub stoch_overbought: f64,
    /// Buy side only: close must hold above this SMA.
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
}

impl Default for BuySellParams {
    fn default() -> Self {
        Self {
            rsi_method: default_rsi_method(),
            max_proximity: default_max_proximity(),
            volatility_window: default_volatility_window(),
            volatility_multiplier: default_volatility_multiplier(),
            volume_multiplier: default_volume_multiplier(),
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
            stoch_oversold: default_stoch_oversold(),
            stoch_overbought: default_stoch_overbought(),
            trend_window: default_trend_window(),
        }
    }
}

/// Latest-bar snapshot the classifier works on.
#[derive(Debug, Clone, PartialEq)]
pub struct BuySellInputs {
    pub close: f64,
    pub volume: f64,
    pub proximity: f64,
    pub bb_lower: Option<f64>,
    pub bb_upper: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub stoch_k: Option<f64>,
    pub psar: Option<f64>,
    pub sma_trend: Option<f64>,
    pub volume_sma: Option<f64>,
}

impl BuySellInputs {
    /// Snapshot the last bar. `None` only for an empty series.
    pub fn from_indicators(
        series: &PriceSeries,
        set: &IndicatorSet,
        config: &IndicatorConfig,
        params: &BuySellParams,
    ) -> Option<Self> {
        let bar = series.last()?;
        Some(Self {
            close: bar.close,
            volume: bar.volume,
            proximity: proximity(&series.closes(), params),
            bb_lower: set.latest(&indicators::bb_lower_key(config.bollinger_window)),
            bb_upper: set.latest(&indicators::bb_upper_key(config.bollinger_window)),
            rsi: set.latest(&indicators::rsi_key(config.rsi_window, params.rsi_method)),
            macd: set.latest(indicators::MACD),
            macd_signal: set.latest(indicators::MACD_SIGNAL),
            stoch_k: set.latest(&indicators::stoch_k_key(config.stoch_k_window)),
            psar: set.latest(indicators::PSAR),
            sma_trend: set.latest(&indicators::sma_key(params.trend_window)),
            volume_sma: set.latest(&indicators::volume_sma_key(config.volume_window)),
        })
    }
}

/// Band proximity tolerance from recent close-to-close volatility.
/// Falls back to `max_proximity` when volatility is undefined.
pub fn proximity(closes: &[f64], params: &BuySellParams) -> f64 {
    let returns = pct_change(closes);
    let vol = last(&rolling_defined(&returns, params.volatility_window, sample_std));
    match vol {
        Some(v) => params.max_proximity.min(params.volatility_multiplier * v),
        None => params.max_proximity,
    }
}

pub fn classify(inputs: &BuySellInputs, params: &BuySellParams) -> SignalAction {
    let close = inputs.close;

    // ── Volume confirmation ──────────────────────────────────────────
    match inputs.volume_sma {
        Some(avg) if inputs.volume >= avg * params.volume_multiplier => {}
        _ => return SignalAction::Hold,
    }

    // ── Buy ──────────────────────────────────────────────────────────
    let buy = (|| {
        let lower = inputs.bb_lower?;
        let rsi = inputs.rsi?;
        let k = inputs.stoch_k?;
        let psar = inputs.psar?;
        let trend = inputs.sma_trend?;
        Some(
            close <= lower * (1.0 + inputs.proximity)
                && rsi > params.rsi_oversold
                && k < params.stoch_oversold
                && close > psar
                && close >= trend,
        )
    })();
    if buy == Some(true) {
        return SignalAction::Buy;
    }

    // ── Sell ─────────────────────────────────────────────────────────
    let sell = (|| {
        let upper = inputs.bb_upper?;
        let rsi = inputs.rsi?;
        if !(close >= upper * (1.0 - inputs.proximity) && rsi < params.rsi_overbought) {
            return Some(false);
        }
        let macd_cross = match (inputs.macd, inputs.macd_signal) {
            (Some(m), Some(s)) => m < s,
            _ => false,
        };
        let stoch_reversal = match (inputs.stoch_k, inputs.psar) {
            (Some(k), Some(p)) => k > params.stoch_overbought && close < p,
            _ => false,
        };
        Some(macd_cross || stoch_reversal)
    })();
    if sell == Some(true) {
        return SignalAction::Sell;
    }

    SignalAction::Hold
}

pub fn evaluate(
    series: &PriceSeries,
    set: &IndicatorSet,
    config: &IndicatorConfig,
    params: &BuySellParams,
) -> Evaluation {
    let Some(inputs) = BuySellInputs::from_indicators(series, set, config, params) else {
        return Evaluation::new(VerdictResult::Signal(SignalAction::Hold), None);
    };
    let action = classify(&inputs, params);
    Evaluation::new(
        VerdictResult::Signal(action),
        Some(json!({
            "close_price": inputs.close,
            "proximity": inputs.proximity,
            "rsi": inputs.rsi,
        })),
    )
}
