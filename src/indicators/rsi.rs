// =============================================================================
// Relative Strength Index (RSI) — simple-average and Wilder variants
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1: Compute price changes (deltas) from consecutive closes.
// Step 2: Average the gains and the losses, either
//            Simple : rolling mean over the trailing `window` deltas
//            Wilder : exponential smoothing, alpha = 1 / window, over the
//                     delta series with a zero delta at index 0 (`ta` RSI)
// Step 3: RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Simple is defined from index `window`, Wilder from index `window - 1`.
//
// Thresholds:  RSI > 70 => OVERBOUGHT,  RSI < 30 => OVERSOLD.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::numeric::{rolling, Series};

/// Which averaging scheme to use for gains and losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiMethod {
    /// Rolling arithmetic mean of gains and losses.
    Simple,
    /// Wilder's exponential smoothing.
    Wilder,
}

/// Compute the RSI series aligned with `closes`.
///
/// # Edge cases
/// - `window == 0` => every entry undefined
/// - Simple needs `window` deltas (`closes.len() > window`), Wilder needs
///   `window` closes
/// - Flat window (no gains, no losses) => 50.0 (neutral)
/// - Only gains => 100.0
pub fn calculate_rsi(closes: &[f64], window: usize, method: RsiMethod) -> Series {
    let len = closes.len();
    let mut out = vec![None; len];
    if window == 0 || len < 2 {
        return out;
    }

    // --- Compute price deltas ------------------------------------------------
    let gains: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
    let losses: Vec<f64> = closes.windows(2).map(|w| (w[0] - w[1]).max(0.0)).collect();

    match method {
        RsiMethod::Simple => {
            if len <= window {
                return out;
            }
            let avg_gain = rolling(&gains, window, crate::numeric::mean);
            let avg_loss = rolling(&losses, window, crate::numeric::mean);
            // Delta j describes the move into close j + 1.
            for j in 0..gains.len() {
                if let (Some(g), Some(l)) = (avg_gain[j], avg_loss[j]) {
                    out[j + 1] = rsi_from_averages(g, l);
                }
            }
        }
        RsiMethod::Wilder => {
            // Index 0 has no delta; it counts as a zero move, which seeds
            // both averages at 0.
            let alpha = 1.0 / window as f64;
            let (mut avg_gain, mut avg_loss) = (0.0, 0.0);
            if window == 1 {
                out[0] = rsi_from_averages(avg_gain, avg_loss);
            }
            for j in 0..gains.len() {
                avg_gain = alpha * gains[j] + (1.0 - alpha) * avg_gain;
                avg_loss = alpha * losses[j] + (1.0 - alpha) * avg_loss;
                if j + 2 >= window {
                    out[j + 1] = rsi_from_averages(avg_gain, avg_loss);
                }
            }
        }
    }

    out
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// - If both averages are zero, RSI is 50.0 (no movement).
/// - If average loss is zero (only gains), RSI is 100.0.
/// - Returns `None` when the result is non-finite.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0 // No movement at all: neutral.
    } else if avg_loss == 0.0 {
        100.0 // All gains, no losses.
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
