// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   MACD      = EMA(fast) - EMA(slow)
//   Signal    = EMA(signal) of MACD
//   Histogram = MACD - Signal
//
// All EMAs are first-observation seeded, so the three lines are defined from
// the first bar.
// =============================================================================

use super::ema::{calculate_ema, calculate_ema_of};
use crate::numeric::Series;

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub macd: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    let macd: Series = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = calculate_ema_of(&macd, signal);
    let histogram = macd
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    Macd {
        macd,
        signal: signal_line,
        histogram,
    }
}
