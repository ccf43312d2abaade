//! # Tail Risk
//!
//! $$
//! \mathrm{VaR}_c = r_{(\lfloor(1-c)T\rfloor)}\sqrt{h},\qquad
//! \mathrm{CVaR}_c = \frac{\sqrt{h}}{k}\sum_{i<k} r_{(i)},\; k=\lfloor(1-c)T\rfloor
//! $$
//!
//! Historical (empirical-quantile) VaR and expected shortfall. Values are signed
//! returns, so a loss is negative. Multi-period figures use square-root-of-time scaling.

use ordered_float::OrderedFloat;

/// Confidence levels reported when none are configured.
pub const DEFAULT_CONFIDENCE_LEVELS: [f64; 2] = [0.95, 0.99];

fn sorted_finite(returns: &[f64]) -> Option<Vec<f64>> {
  if returns.iter().any(|r| !r.is_finite()) {
    return None;
  }
  let mut sorted = returns.to_vec();
  sorted.sort_by_key(|&r| OrderedFloat(r));
  Some(sorted)
}

fn cutoff_index(len: usize, confidence: f64) -> usize {
  (((1.0 - confidence) * len as f64).floor() as usize).min(len.saturating_sub(1))
}

fn valid_confidence(confidence: f64) -> bool {
  confidence > 0.0 && confidence < 1.0
}

/// Historical VaR at `confidence` over `horizon` periods.
///
/// `None` for one or fewer observations, a confidence outside `(0, 1)` or a zero horizon.
pub fn value_at_risk(returns: &[f64], confidence: f64, horizon: usize) -> Option<f64> {
  if returns.len() <= 1 || !valid_confidence(confidence) || horizon == 0 {
    return None;
  }

  let sorted = sorted_finite(returns)?;
  let index = cutoff_index(sorted.len(), confidence);
  Some(sorted[index] * (horizon as f64).sqrt())
}

/// Mean of the returns strictly below the VaR cutoff, scaled to `horizon`.
///
/// `None` when the cutoff index is zero, i.e. the sample has no tail mass at this confidence.
pub fn conditional_value_at_risk(returns: &[f64], confidence: f64, horizon: usize) -> Option<f64> {
  if returns.is_empty() || !valid_confidence(confidence) || horizon == 0 {
    return None;
  }

  let sorted = sorted_finite(returns)?;
  let index = cutoff_index(sorted.len(), confidence);
  if index == 0 {
    return None;
  }

  let tail_mean = sorted[..index].iter().sum::<f64>() / index as f64;
  Some(tail_mean * (horizon as f64).sqrt())
}

/// VaR and CVaR at one confidence level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TailRisk {
  pub confidence: f64,
  pub var: Option<f64>,
  pub cvar: Option<f64>,
}

/// VaR/CVaR for each confidence level, in the order given.
pub fn tail_risk(returns: &[f64], confidence_levels: &[f64], horizon: usize) -> Vec<TailRisk> {
  confidence_levels
    .iter()
    .map(|&confidence| TailRisk {
      confidence,
      var: value_at_risk(returns, confidence, horizon),
      cvar: conditional_value_at_risk(returns, confidence, horizon),
    })
    .collect()
}
