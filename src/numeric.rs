// =============================================================================
// Numeric helpers shared by the indicator engine and the screens
// =============================================================================
//
// Every helper maps undefined input (None, non-finite) and undefined maths
// (division by zero, empty windows) to `None` instead of NaN, so a screen
// can never compare against a silently poisoned value.

/// An indicator series aligned 1:1 with the price series. `None` marks an
/// entry whose rolling window is not yet full or whose value is undefined.
pub type Series = Vec<Option<f64>>;

/// Wrap a float as `Some` only when it is finite.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// `num / den`, undefined when the denominator is zero or the result is not
/// finite.
pub fn safe_div(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        return None;
    }
    finite(num / den)
}

/// Arithmetic mean of a slice; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (ddof = 1). Needs at least two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    finite(var.sqrt())
}

/// Apply `f` to every full trailing window of `values`. Entries before the
/// first full window are `None`.
pub fn rolling<F>(values: &[f64], window: usize, f: F) -> Series
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for end in window..=values.len() {
        out[end - 1] = f(&values[end - window..end]);
    }
    out
}

/// Rolling function over a series that may contain undefined entries: the
/// output is undefined whenever any entry in the window is undefined.
pub fn rolling_defined<F>(values: &[Option<f64>], window: usize, f: F) -> Series
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let mut buf = Vec::with_capacity(window);
    for end in window..=values.len() {
        buf.clear();
        buf.extend(values[end - window..end].iter().filter_map(|v| *v));
        if buf.len() == window {
            out[end - 1] = f(&buf);
        }
    }
    out
}

/// Rolling mean, undefined until `window` observations exist.
pub fn rolling_mean(values: &[f64], window: usize) -> Series {
    rolling(values, window, mean)
}

/// Rolling minimum.
pub fn rolling_min(values: &[f64], window: usize) -> Series {
    rolling(values, window, |w| finite(w.iter().copied().fold(f64::INFINITY, f64::min)))
}

/// Rolling maximum.
pub fn rolling_max(values: &[f64], window: usize) -> Series {
    rolling(values, window, |w| finite(w.iter().copied().fold(f64::NEG_INFINITY, f64::max)))
}

/// One-bar percent change. Index 0 is undefined.
pub fn pct_change(values: &[f64]) -> Series {
    let mut out = vec![None; values.len()];
    for i in 1..values.len() {
        out[i] = safe_div(values[i] - values[i - 1], values[i - 1]);
    }
    out
}

/// Maximum of the trailing `window` values ending at the last element,
/// accepting a shorter history (min_periods = 1).
pub fn trailing_max(values: &[f64], window: usize) -> Option<f64> {
    let start = values.len().saturating_sub(window);
    let tail = &values[start..];
    if tail.is_empty() {
        return None;
    }
    finite(tail.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Minimum of the trailing `window` values, accepting a shorter history.
pub fn trailing_min(values: &[f64], window: usize) -> Option<f64> {
    let start = values.len().saturating_sub(window);
    let tail = &values[start..];
    if tail.is_empty() {
        return None;
    }
    finite(tail.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Least-squares slope of `ys` against x = 0, 1, 2, ...
pub fn linear_slope(ys: &[f64]) -> Option<f64> {
    if ys.len() < 2 {
        return None;
    }
    let n = ys.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(ys)?;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    safe_div(num, den)
}

/// Last value of a series, flattening the undefined case.
pub fn last(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Value `offset` bars before the last one.
pub fn nth_back(series: &[Option<f64>], offset: usize) -> Option<f64> {
    let len = series.len();
    if offset >= len {
        return None;
    }
    series[len - 1 - offset]
}
