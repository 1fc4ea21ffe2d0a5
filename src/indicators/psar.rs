// =============================================================================
// Parabolic SAR (Stop And Reverse) — Wilder
// =============================================================================
//
// A trailing stop that accelerates toward price while a trend persists and
// flips side when price penetrates it.  Unlike the windowed indicators it
// carries state across the whole series:
//
//   sar        current stop level
//   extreme    highest high (long) / lowest low (short) of the current trend
//   af         acceleration factor, +step on each new extreme, capped at max
//   rising     trend direction
//
// Seed (bar 1): direction from the first two closes, SAR = close[1],
// extreme = the extreme of bars 0..=1 in that direction, af = step.
//
// Per bar i >= 2:
//   sar' = sar + af * (extreme - sar)
//   long : low_i  < sar' => flip short, sar' = extreme, extreme = low_i,  af = step
//          else new high raises af; sar' <= min(low_{i-1}, low_{i-2})
//   short: high_i > sar' => flip long,  sar' = extreme, extreme = high_i, af = step
//          else new low raises af;  sar' >= max(high_{i-1}, high_{i-2})
//
// The first two outputs are undefined.
// =============================================================================

use crate::numeric::Series;

/// Parabolic SAR acceleration settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsarParams {
    pub step: f64,
    pub max_step: f64,
}

impl Default for PsarParams {
    fn default() -> Self {
        Self {
            step: 0.02,
            max_step: 0.2,
        }
    }
}

/// State threaded through the forward scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsarState {
    pub sar: f64,
    pub extreme: f64,
    pub af: f64,
    pub rising: bool,
}

impl PsarState {
    /// Seed the recursion from the first two bars.
    fn seed(highs: &[f64], lows: &[f64], closes: &[f64], params: PsarParams) -> Self {
        let rising = closes[1] >= closes[0];
        let extreme = if rising {
            highs[0].max(highs[1])
        } else {
            lows[0].min(lows[1])
        };
        Self {
            sar: closes[1],
            extreme,
            af: params.step,
            rising,
        }
    }

    /// Advance the state by bar `i` (requires i >= 2).
    fn advance(self, i: usize, highs: &[f64], lows: &[f64], params: PsarParams) -> Self {
        let (high, low) = (highs[i], lows[i]);
        let mut sar = self.sar + self.af * (self.extreme - self.sar);

        if self.rising {
            if low < sar {
                return Self {
                    sar: self.extreme,
                    extreme: low,
                    af: params.step,
                    rising: false,
                };
            }
            let (extreme, af) = if high > self.extreme {
                (high, (self.af + params.step).min(params.max_step))
            } else {
                (self.extreme, self.af)
            };
            sar = sar.min(lows[i - 1]).min(lows[i - 2]);
            Self {
                sar,
                extreme,
                af,
                rising: true,
            }
        } else {
            if high > sar {
                return Self {
                    sar: self.extreme,
                    extreme: high,
                    af: params.step,
                    rising: true,
                };
            }
            let (extreme, af) = if low < self.extreme {
                (low, (self.af + params.step).min(params.max_step))
            } else {
                (self.extreme, self.af)
            };
            sar = sar.max(highs[i - 1]).max(highs[i - 2]);
            Self {
                sar,
                extreme,
                af,
                rising: false,
            }
        }
    }
}

/// Full per-bar state trace (index aligned; `None` for the first two bars).
pub fn psar_states(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    params: PsarParams,
) -> Vec<Option<PsarState>> {
    let len = closes.len().min(highs.len()).min(lows.len());
    let mut out = vec![None; closes.len()];
    if len < 3 {
        return out;
    }

    let seed = PsarState::seed(highs, lows, closes, params);
    let trace = (2..len).scan(seed, |state, i| {
        *state = state.advance(i, highs, lows, params);
        Some(*state)
    });
    for (i, state) in (2..len).zip(trace) {
        out[i] = state.sar.is_finite().then_some(state);
    }
    out
}

/// Parabolic SAR level per bar.
pub fn calculate_psar(highs: &[f64], lows: &[f64], closes: &[f64], params: PsarParams) -> Series {
    psar_states(highs, lows, closes, params)
        .into_iter()
        .map(|s| s.map(|s| s.sar))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, up: bool) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let closes: Vec<f64> = (0..n)
            .map(|i| if up { 100.0 + i as f64 } else { 200.0 - i as f64 })
            .collect();
        let highs = closes.iter().map(|c| c + 0.5).collect();
        let lows = closes.iter().map(|c| c - 0.5).collect();
        (highs, lows, closes)
    }

    #[test]
    fn first_two_bars_undefined() {
        let (h, l, c) = ramp(10, true);
        let sar = calculate_psar(&h, &l, &c, PsarParams::default());
        assert_eq!(sar[0], None);
        assert_eq!(sar[1], None);
        assert!(sar[2].is_some());
        assert_eq!(calculate_psar(&h[..2], &l[..2], &c[..2], PsarParams::default()), vec![None, None]);
    }

    #[test]
    fn uptrend_keeps_sar_below_price_and_accelerates() {
        let (h, l, c) = ramp(40, true);
        let states = psar_states(&h, &l, &c, PsarParams::default());
        for i in 2..40 {
            let s = states[i].unwrap();
            assert!(s.rising);
            assert!(s.sar < l[i], "bar {i}: sar {} not below low {}", s.sar, l[i]);
        }
        // Every bar makes a new high: af climbs to the cap.
        assert!((states[39].unwrap().af - 0.2).abs() < 1e-12);
    }

    #[test]
    fn downtrend_keeps_sar_above_price() {
        let (h, l, c) = ramp(30, false);
        let states = psar_states(&h, &l, &c, PsarParams::default());
        for i in 2..30 {
            let s = states[i].unwrap();
            assert!(!s.rising);
            assert!(s.sar > h[i]);
        }
    }

    #[test]
    fn reversal_flips_to_extreme_and_resets_af() {
        let (mut h, mut l, mut c) = ramp(20, true);
        // Crash on bar 20.
        c.push(80.0);
        h.push(81.0);
        l.push(79.0);
        let states = psar_states(&h, &l, &c, PsarParams::default());
        let before = states[19].unwrap();
        let after = states[20].unwrap();
        assert!(!after.rising);
        assert_eq!(after.sar, before.extreme);
        assert_eq!(after.extreme, 79.0);
        assert!((after.af - 0.02).abs() < 1e-12);
        assert!(after.sar > c[20]);
    }

    #[test]
    fn hand_computed_trace_through_two_reversals() {
        let h = [10.0, 11.0, 12.0, 13.0, 12.5, 11.0, 10.0, 11.6, 12.0];
        let l = [9.0, 10.0, 10.8, 11.5, 11.0, 9.5, 9.0, 10.0, 11.0];
        let c = [9.5, 10.5, 11.5, 12.5, 11.5, 10.0, 9.5, 11.5, 11.8];
        let params = PsarParams {
            step: 0.1,
            max_step: 0.2,
        };
        // (sar, extreme, af, rising) after each bar, seeded long at sar 10.5 / ep 11.
        let expected = [
            // 10.55 clamped to the lows of bars 0..=1; new high => af 0.2
            (9.0, 12.0, 0.2, true),
            // 9 + 0.2 * 3; af stays capped at 0.2
            (9.6, 13.0, 0.2, true),
            // no new high: ep and af unchanged
            (10.28, 13.0, 0.2, true),
            // low 9.5 pierces 10.824: flip short at the old ep
            (13.0, 9.5, 0.1, false),
            // 13 - 0.1 * 3.5 = 12.65, above the prior highs; new low => af 0.2
            (12.65, 9.0, 0.2, false),
            // 12.65 - 0.2 * 3.65
            (11.92, 9.0, 0.2, false),
            // high 12 pierces 11.336: flip long at the old ep
            (9.0, 12.0, 0.1, true),
        ];

        let states = psar_states(&h, &l, &c, params);
        for (offset, &(sar, extreme, af, rising)) in expected.iter().enumerate() {
            let i = offset + 2;
            let s = states[i].unwrap();
            assert!((s.sar - sar).abs() < 1e-9, "bar {i}: sar {} != {sar}", s.sar);
            assert!((s.extreme - extreme).abs() < 1e-12, "bar {i}: ep {}", s.extreme);
            assert!((s.af - af).abs() < 1e-12, "bar {i}: af {}", s.af);
            assert_eq!(s.rising, rising, "bar {i}");
        }
    }

    #[test]
    fn scan_is_deterministic() {
        let (h, l, c) = ramp(25, true);
        let a = calculate_psar(&h, &l, &c, PsarParams::default());
        let b = calculate_psar(&h, &l, &c, PsarParams::default());
        assert_eq!(a, b);
    }
}
