// =============================================================================
// Stochastic Oscillator (%K / %D)
// =============================================================================
//
//   %K = 100 * (close - lowest_low(k)) / (highest_high(k) - lowest_low(k))
//   %D = SMA(%K, d)
//
// A flat range (highest_high == lowest_low) leaves %K undefined for that bar,
// and any %D window touching an undefined %K is undefined too.
// =============================================================================

use crate::numeric::{mean, rolling_defined, rolling_max, rolling_min, safe_div, Series};

#[derive(Debug, Clone, PartialEq)]
pub struct Stochastic {
    pub k: Series,
    pub d: Series,
}

pub fn calculate_stochastic(
    closes: &[f64],
    highs: &[f64],
    lows: &[f64],
    k_window: usize,
    d_window: usize,
) -> Stochastic {
    let lowest = rolling_min(lows, k_window);
    let highest = rolling_max(highs, k_window);

    let k: Series = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let lo = lowest.get(i).copied().flatten()?;
            let hi = highest.get(i).copied().flatten()?;
            safe_div(c - lo, hi - lo).map(|r| 100.0 * r)
        })
        .collect();
    let d = rolling_defined(&k, d_window, mean);

    Stochastic { k, d }
}
