//! # Portfolio Risk Metrics
//!
//! $$
//! \sigma_{ann} = s_{r_p}\sqrt{P},\qquad
//! \mathrm{TE} = s_{r_p - r_m}\sqrt{P}
//! $$
//!
//! Distribution moments, tail risk, drawdown and market-relative figures for a
//! weighted portfolio, bundled into one immutable value.

use statrs::statistics::Statistics;

use super::drawdown::max_drawdown;
use super::drawdown::Drawdown;
use super::tail::tail_risk;
use super::tail::TailRisk;
use super::tail::DEFAULT_CONFIDENCE_LEVELS;
use crate::beta::aligned_pairs;
use crate::beta::estimate_beta_with;
use crate::beta::MIN_BETA_OBSERVATIONS;
use crate::data::ReturnsMatrix;
use crate::data::WeightVector;
use crate::error::FolioError;
use crate::error::Result;

/// Settings for [`portfolio_risk_metrics`].
#[derive(Clone, Debug, PartialEq)]
pub struct RiskMetricsConfig {
  pub confidence_levels: Vec<f64>,
  /// VaR/CVaR horizon in periods.
  pub horizon: usize,
  /// Aligned observations needed for beta and tracking error.
  pub min_observations: usize,
  /// Annualization factor.
  pub periods_per_year: f64,
}

impl Default for RiskMetricsConfig {
  fn default() -> Self {
    Self {
      confidence_levels: DEFAULT_CONFIDENCE_LEVELS.to_vec(),
      horizon: 1,
      min_observations: MIN_BETA_OBSERVATIONS,
      periods_per_year: 252.0,
    }
  }
}

/// Risk profile of one return series. `None` fields were not computable from the sample.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RiskMetrics {
  pub observations: usize,
  /// Annualized volatility.
  pub volatility: Option<f64>,
  /// Biased sample skewness.
  pub skewness: Option<f64>,
  /// Biased sample excess kurtosis.
  pub kurtosis: Option<f64>,
  pub tail: Vec<TailRisk>,
  pub drawdown: Option<Drawdown>,
  pub beta: Option<f64>,
  /// Annualized tracking error against the market series.
  pub tracking_error: Option<f64>,
}

impl RiskMetrics {
  fn tail_at(&self, confidence: f64) -> Option<&TailRisk> {
    self
      .tail
      .iter()
      .find(|t| (t.confidence - confidence).abs() < 1e-12)
  }

  pub fn var(&self, confidence: f64) -> Option<f64> {
    self.tail_at(confidence).and_then(|t| t.var)
  }

  pub fn cvar(&self, confidence: f64) -> Option<f64> {
    self.tail_at(confidence).and_then(|t| t.cvar)
  }

  pub fn max_drawdown(&self) -> Option<f64> {
    self.drawdown.as_ref().map(|d| d.max_drawdown)
  }
}

/// Biased skewness and excess kurtosis; `None` for fewer than two points or zero variance.
fn moments(xs: &[f64]) -> (Option<f64>, Option<f64>) {
  if xs.len() < 2 {
    return (None, None);
  }

  let n = xs.len() as f64;
  let mean = xs.iter().sum::<f64>() / n;

  let mut m2 = 0.0;
  let mut m3 = 0.0;
  let mut m4 = 0.0;
  for &x in xs {
    let d = x - mean;
    let d2 = d * d;
    m2 += d2;
    m3 += d2 * d;
    m4 += d2 * d2;
  }
  m2 /= n;
  m3 /= n;
  m4 /= n;

  if !(m2 > 1e-30) {
    return (None, None);
  }

  (Some(m3 / m2.powf(1.5)), Some(m4 / (m2 * m2) - 3.0))
}

/// Risk metrics of a single periodic return series.
pub fn series_risk_metrics(
  returns: &[f64],
  market: Option<&[f64]>,
  cfg: &RiskMetricsConfig,
) -> RiskMetrics {
  let ann = cfg.periods_per_year.sqrt();

  let volatility = (returns.len() >= 2)
    .then(|| returns.iter().std_dev() * ann)
    .filter(|v| v.is_finite());
  let (skewness, kurtosis) = moments(returns);

  let (beta, tracking_error) = match market {
    Some(m) => {
      let beta = estimate_beta_with(returns, m, cfg.min_observations);
      let (p, mk) = aligned_pairs(returns, m);
      let te = (p.len() >= cfg.min_observations.max(2))
        .then(|| {
          let diff: Vec<f64> = p.iter().zip(mk.iter()).map(|(a, b)| a - b).collect();
          diff.iter().std_dev() * ann
        })
        .filter(|v| v.is_finite());
      (beta, te)
    }
    None => (None, None),
  };

  RiskMetrics {
    observations: returns.len(),
    volatility,
    skewness,
    kurtosis,
    tail: tail_risk(returns, &cfg.confidence_levels, cfg.horizon),
    drawdown: max_drawdown(returns),
    beta,
    tracking_error,
  }
}

/// Risk metrics of the weighted portfolio built from `returns`.
///
/// Held symbols without return history are ignored; at least one must be present.
pub fn portfolio_risk_metrics(
  returns: &ReturnsMatrix,
  weights: &WeightVector,
  market: Option<&[f64]>,
  cfg: &RiskMetricsConfig,
) -> Result<RiskMetrics> {
  let held = weights
    .symbols()
    .iter()
    .filter(|s| returns.index_of(s).is_some())
    .count();
  if held == 0 {
    return Err(FolioError::insufficient(1, 0, "held symbols with return history"));
  }

  let port = returns.portfolio_returns(weights).to_vec();
  Ok(series_risk_metrics(&port, market, cfg))
}
