// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), where σ is the rolling *sample* standard
// deviation (ddof = 1). The band width is upper - lower.

use crate::numeric::{rolling, sample_std, Series};

use super::sma::calculate_sma;

/// Aligned band series.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

#[cfg(test)]
impl BollingerBands {
    /// Absolute band width (upper - lower) per bar.
    pub fn width(&self) -> Series {
        self.upper
            .iter()
            .zip(&self.lower)
            .map(|(u, l)| Some((*u)? - (*l)?))
            .collect()
    }
}

/// Calculate Bollinger Bands for the given closing prices.
///
/// Every band is undefined until `window` closes exist. `window` must be at
/// least 2 for the sample standard deviation to exist; a smaller window
/// yields all-undefined bands.
pub fn calculate_bollinger(closes: &[f64], window: usize, num_std: f64) -> BollingerBands {
    let middle = calculate_sma(closes, window);
    let std = if window >= 2 {
        rolling(closes, window, sample_std)
    } else {
        vec![None; closes.len()]
    };

    let (upper, lower) = middle
        .iter()
        .zip(&std)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => (Some(m + num_std * s), Some(m - num_std * s)),
            _ => (None, None),
        })
        .unzip();

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0);
        let (u, m, l) = (bb.upper[19].unwrap(), bb.middle[19].unwrap(), bb.lower[19].unwrap());
        assert!((m - 10.5).abs() < 1e-12);
        // sample std of 1..=20 = sqrt(35)
        assert!((u - (10.5 + 2.0 * 35f64.sqrt())).abs() < 1e-9);
        assert!(l < m && m < u);
        assert!(bb.upper[18].is_none());
    }

    #[test]
    fn bollinger_insufficient_data() {
        let bb = calculate_bollinger(&[1.0, 2.0, 3.0], 20, 2.0);
        assert!(bb.upper.iter().chain(&bb.lower).all(Option::is_none));
        assert_eq!(bb.upper.len(), 3);
    }

    #[test]
    fn bollinger_flat_has_zero_width() {
        let bb = calculate_bollinger(&[100.0; 25], 20, 2.0);
        let widths: Vec<f64> = bb.width().into_iter().flatten().collect();
        assert_eq!(widths.len(), 6);
        assert!(widths.iter().all(|w| w.abs() < 1e-12));
    }

    #[test]
    fn bollinger_window_one_is_undefined() {
        let bb = calculate_bollinger(&[1.0, 2.0], 1, 2.0);
        assert!(bb.upper.iter().all(Option::is_none));
    }
}
