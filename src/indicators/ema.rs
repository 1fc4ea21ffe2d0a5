// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   alpha  = 2 / (span + 1)
//   EMA_0  = close_0
//   EMA_t  = alpha * close_t + (1 - alpha) * EMA_{t-1}
//
// The recursion is seeded by the first observation (not an SMA), so the
// series is defined from index 0.
// =============================================================================

use crate::numeric::{finite, Series};

/// Compute the EMA series for `values` with the given `span`.
///
/// # Edge cases
/// - `span == 0` => every entry undefined
/// - Empty input => empty series
/// - A non-finite intermediate value makes that entry and every later entry
///   undefined.
pub fn calculate_ema(values: &[f64], span: usize) -> Series {
    let mut out = vec![None; values.len()];
    if span == 0 || values.is_empty() {
        return out;
    }
    let alpha = 2.0 / (span as f64 + 1.0);

    let mut prev: Option<f64> = None;
    for (i, &v) in values.iter().enumerate() {
        let next = match prev {
            None => finite(v),
            Some(p) => finite(alpha * v + (1.0 - alpha) * p),
        };
        match next {
            Some(e) => {
                out[i] = Some(e);
                prev = Some(e);
            }
            // Broken recursion: nothing after this point can be trusted.
            None => break,
        }
    }
    out
}

/// EMA over a series with undefined leading entries (e.g. the MACD line).
/// The recursion is seeded at the first defined entry; an undefined entry
/// after the seed breaks the series.
pub fn calculate_ema_of(values: &[Option<f64>], span: usize) -> Series {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(Option::is_some) else {
        return out;
    };
    let tail: Vec<f64> = values[start..].iter().map_while(|v| *v).collect();
    for (i, v) in calculate_ema(&tail, span).into_iter().enumerate() {
        out[start + i] = v;
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_span_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn ema_single_observation_is_the_seed() {
        assert_eq!(calculate_ema(&[42.5], 21), vec![Some(42.5)]);
    }

    #[test]
    fn ema_known_values() {
        // span 3 => alpha = 0.5
        let ema = calculate_ema(&[2.0, 4.0, 6.0, 8.0], 3);
        let expected = [2.0, 3.0, 4.5, 6.25];
        for (a, b) in ema.iter().zip(expected.iter()) {
            assert!((a.unwrap() - b).abs() < 1e-12, "got {a:?}, expected {b}");
        }
    }

    #[test]
    fn ema_of_constant_is_constant() {
        let ema = calculate_ema(&[100.0; 50], 12);
        assert!(ema.iter().all(|v| (v.unwrap() - 100.0).abs() < 1e-12));
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let ema = calculate_ema(&[1.0, 2.0, f64::NAN, 4.0], 3);
        assert!(ema[0].is_some() && ema[1].is_some());
        assert_eq!(ema[2], None);
        assert_eq!(ema[3], None);
    }

    #[test]
    fn ema_of_seeds_at_first_defined() {
        let values = vec![None, None, Some(2.0), Some(4.0)];
        let ema = calculate_ema_of(&values, 3);
        assert_eq!(ema, vec![None, None, Some(2.0), Some(3.0)]);
        assert!(calculate_ema_of(&[None, None], 3).iter().all(Option::is_none));
    }
}
