//! # Drawdown
//!
//! $$
//! C_t = \prod_{i\le t}(1+r_i),\quad M_t = \max_{s\le t} C_s,\quad D_t = \frac{C_t - M_t}{M_t}
//! $$
//!

/// Maximum drawdown of a return series.
#[derive(Clone, Debug, PartialEq)]
pub struct Drawdown {
  /// `min_t D_t`, zero or negative.
  pub max_drawdown: f64,
  /// Index of the peak the maximum drawdown is measured from.
  pub start: usize,
  /// Index of the trough.
  pub end: usize,
  /// Full drawdown series `D_t`.
  pub series: Vec<f64>,
}

/// Peak-to-trough decline of the cumulative wealth index. `None` for an empty series.
pub fn max_drawdown(returns: &[f64]) -> Option<Drawdown> {
  if returns.is_empty() {
    return None;
  }

  let mut wealth = Vec::with_capacity(returns.len());
  let mut peaks = Vec::with_capacity(returns.len());
  let mut series = Vec::with_capacity(returns.len());

  let mut c = 1.0;
  let mut m = f64::NEG_INFINITY;
  for &r in returns {
    c *= 1.0 + r;
    m = m.max(c);
    wealth.push(c);
    peaks.push(m);
    series.push(if m > 0.0 { (c - m) / m } else { -1.0 });
  }

  if series.iter().any(|d| !d.is_finite()) {
    return None;
  }

  let mut end = 0;
  for (t, &d) in series.iter().enumerate() {
    if d < series[end] {
      end = t;
    }
  }

  let peak = peaks[end];
  let start = (0..=end).rev().find(|&i| wealth[i] == peak).unwrap_or(end);

  Some(Drawdown {
    max_drawdown: series[end],
    start,
    end,
    series,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn finds_peak_and_trough() {
    // wealth: 1.1, 1.21, 0.968, 0.8712, 1.04544, 1.3
    let returns = [0.1, 0.1, -0.2, -0.1, 0.2, 0.2435];
    let dd = max_drawdown(&returns).unwrap();

    assert_eq!(dd.start, 1);
    assert_eq!(dd.end, 3);
    assert_abs_diff_eq!(dd.max_drawdown, 0.8712 / 1.21 - 1.0, epsilon = 1e-12);
    assert_eq!(dd.series.len(), returns.len());
  }

  #[test]
  fn monotone_gains_have_zero_drawdown() {
    let dd = max_drawdown(&[0.01, 0.02, 0.03]).unwrap();
    assert_eq!(dd.max_drawdown, 0.0);
    assert_eq!(dd.start, dd.end);
  }

  #[test]
  fn empty_series_is_undefined() {
    assert_eq!(max_drawdown(&[]), None);
  }
}
