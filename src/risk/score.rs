//! # Risk Score
//!
//! $$
//! S = \operatorname{clip}_{[0,100]}\Big(
//! 30\,\tfrac{\sigma}{0.40} + 25\,\tfrac{|\mathrm{VaR}_{95}|}{0.05}
//! + 25\,\tfrac{|\mathrm{MDD}|}{0.50} + 20\,\tfrac{|\beta|-0.5}{1.5}\Big)
//! $$
//!
//! Each term is clipped to its point budget before summing. Missing inputs fall back
//! to neutral defaults instead of aborting.

use super::metrics::RiskMetrics;

pub const DEFAULT_VOLATILITY: f64 = 0.20;
pub const DEFAULT_VAR_95: f64 = 0.025;
pub const DEFAULT_MAX_DRAWDOWN: f64 = 0.20;
pub const DEFAULT_BETA: f64 = 1.0;

const VOLATILITY_POINTS: f64 = 30.0;
const VOLATILITY_CEILING: f64 = 0.40;
const VAR_POINTS: f64 = 25.0;
const VAR_CEILING: f64 = 0.05;
const DRAWDOWN_POINTS: f64 = 25.0;
const DRAWDOWN_CEILING: f64 = 0.50;
const BETA_POINTS: f64 = 20.0;
const BETA_FLOOR: f64 = 0.5;
const BETA_SPAN: f64 = 1.5;

/// Raw inputs to the score; `None` means unavailable.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RiskScoreInputs {
  pub volatility: Option<f64>,
  pub var_95: Option<f64>,
  pub max_drawdown: Option<f64>,
  pub beta: Option<f64>,
}

impl From<&RiskMetrics> for RiskScoreInputs {
  fn from(m: &RiskMetrics) -> Self {
    Self {
      volatility: m.volatility,
      var_95: m.var(0.95),
      max_drawdown: m.max_drawdown(),
      beta: m.beta,
    }
  }
}

/// Composite score with its per-component points.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RiskScore {
  pub total: f64,
  pub volatility: f64,
  pub var: f64,
  pub drawdown: f64,
  pub beta: f64,
}

fn or_default(x: Option<f64>, default: f64) -> f64 {
  x.filter(|v| v.is_finite()).unwrap_or(default)
}

fn points(ratio: f64, budget: f64) -> f64 {
  (ratio * budget).clamp(0.0, budget)
}

/// Score in `[0, 100]`, higher is riskier.
pub fn risk_score(inputs: &RiskScoreInputs) -> RiskScore {
  let vol = or_default(inputs.volatility, DEFAULT_VOLATILITY).abs();
  let var = or_default(inputs.var_95, DEFAULT_VAR_95).abs();
  let dd = or_default(inputs.max_drawdown, DEFAULT_MAX_DRAWDOWN).abs();
  let beta = or_default(inputs.beta, DEFAULT_BETA).abs();

  let volatility = points(vol / VOLATILITY_CEILING, VOLATILITY_POINTS);
  let var = points(var / VAR_CEILING, VAR_POINTS);
  let drawdown = points(dd / DRAWDOWN_CEILING, DRAWDOWN_POINTS);
  let beta = points((beta - BETA_FLOOR) / BETA_SPAN, BETA_POINTS);

  RiskScore {
    total: (volatility + var + drawdown + beta).clamp(0.0, 100.0),
    volatility,
    var,
    drawdown,
    beta,
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn missing_inputs_use_neutral_defaults() {
    let s = risk_score(&RiskScoreInputs::default());
    assert_abs_diff_eq!(s.volatility, 15.0, epsilon = 1e-12);
    assert_abs_diff_eq!(s.var, 12.5, epsilon = 1e-12);
    assert_abs_diff_eq!(s.drawdown, 10.0, epsilon = 1e-12);
    assert_abs_diff_eq!(s.beta, 20.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(s.total, 15.0 + 12.5 + 10.0 + 20.0 / 3.0, epsilon = 1e-12);
  }

  #[test]
  fn components_are_clipped_to_budget() {
    let s = risk_score(&RiskScoreInputs {
      volatility: Some(0.9),
      var_95: Some(-0.2),
      max_drawdown: Some(-0.8),
      beta: Some(3.0),
    });
    assert_eq!(s.total, 100.0);

    let calm = risk_score(&RiskScoreInputs {
      volatility: Some(0.0),
      var_95: Some(0.0),
      max_drawdown: Some(0.0),
      beta: Some(0.2),
    });
    assert_eq!(calm.beta, 0.0);
    assert_eq!(calm.total, 0.0);
  }

  #[test]
  fn non_finite_inputs_fall_back() {
    let s = risk_score(&RiskScoreInputs {
      volatility: Some(f64::NAN),
      ..Default::default()
    });
    assert_abs_diff_eq!(s.volatility, 15.0, epsilon = 1e-12);
  }
}
