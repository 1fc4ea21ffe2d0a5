use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }
}

// ---------------------------------------------------------------------------
// PriceSeries -- ordered, de-duplicated bars for one instrument
// ---------------------------------------------------------------------------

/// Ordered bar history for one instrument. Timestamps are strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, sorting the bars by timestamp.
    ///
    /// Fails on duplicate timestamps or non-finite prices; providers are
    /// expected to hand over clean daily bars.
    pub fn new(symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Result<Self> {
        let symbol = symbol.into();
        bars.sort_by_key(|b| b.timestamp);

        if let Some(bad) = bars.iter().find(|b| !b.is_finite()) {
            bail!("{symbol}: non-finite bar at {}", bad.timestamp);
        }
        if let Some(w) = bars.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            bail!("{symbol}: duplicate bar at {}", w[0].timestamp);
        }

        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    /// Series restricted to the first `len` bars (the history as seen on bar
    /// `len - 1`).
    #[cfg(test)]
    pub fn truncated(&self, len: usize) -> Self {
        Self {
            symbol: self.symbol.clone(),
            bars: self.bars[..len.min(self.bars.len())].to_vec(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn new_sorts_bars() {
        let bars = vec![bar_at(2, 3.0, 3.0, 3.0, 3.0, 1.0), bar_at(0, 1.0, 1.0, 1.0, 1.0, 1.0)];
        let s = PriceSeries::new("AAPL", bars).unwrap();
        assert_eq!(s.closes(), vec![1.0, 3.0]);
        assert_eq!(s.symbol(), "AAPL");
    }

    #[test]
    fn new_rejects_duplicates() {
        let bars = vec![bar_at(1, 1.0, 1.0, 1.0, 1.0, 1.0), bar_at(1, 2.0, 2.0, 2.0, 2.0, 1.0)];
        assert!(PriceSeries::new("AAPL", bars).is_err());
    }

    #[test]
    fn new_rejects_nan() {
        let bars = vec![bar_at(0, 1.0, f64::NAN, 1.0, 1.0, 1.0)];
        assert!(PriceSeries::new("AAPL", bars).is_err());
    }

    #[test]
    fn truncated_keeps_prefix() {
        let s = series_from_closes("X", &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.truncated(2).closes(), vec![1.0, 2.0]);
        assert_eq!(s.truncated(10).len(), 4);
    }
}
