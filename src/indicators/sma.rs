// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// SMA_t = mean(close_{t-window+1} .. close_t)
//
// Undefined until `window` observations exist.
// =============================================================================

use crate::numeric::{rolling_mean, Series};

/// Compute the SMA series aligned with `values`.
///
/// # Edge cases
/// - `window == 0` => every entry undefined
/// - `values.len() < window` => every entry undefined
pub fn calculate_sma(values: &[f64], window: usize) -> Series {
    rolling_mean(values, window)
}
