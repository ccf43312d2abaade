//! # Beta
//!
//! $$
//! \beta = \frac{\operatorname{Cov}(r_a, r_m)}{\operatorname{Var}(r_m)},\qquad
//! \beta_p = \sum_i w_i \beta_i
//! $$
//!
//! Market-sensitivity estimates. Pure functions over caller-supplied return series:
//! fetching the index history is the price provider's job.

use statrs::statistics::Statistics;
use tracing::debug;

use crate::data::ReturnsMatrix;

/// Aligned observations required before a beta is reported.
pub const MIN_BETA_OBSERVATIONS: usize = 30;

const MIN_MARKET_VARIANCE: f64 = 1e-20;

/// Beta of one asset against the market with the default observation floor.
///
/// Returns `None` when fewer than [`MIN_BETA_OBSERVATIONS`] aligned points exist or the
/// market series has no variance.
pub fn estimate_beta(asset: &[f64], market: &[f64]) -> Option<f64> {
  estimate_beta_with(asset, market, MIN_BETA_OBSERVATIONS)
}

/// Beta with an explicit observation floor.
///
/// The series are aligned on their common tail; pairs with a non-finite side are dropped.
pub fn estimate_beta_with(asset: &[f64], market: &[f64], min_observations: usize) -> Option<f64> {
  let (a, m) = aligned_pairs(asset, market);
  if a.len() < min_observations.max(2) {
    return None;
  }

  let var_m = m.iter().variance();
  if !(var_m > MIN_MARKET_VARIANCE) {
    debug!(var_m, "market variance too small for beta");
    return None;
  }

  let beta = a.iter().covariance(m.iter()) / var_m;
  beta.is_finite().then_some(beta)
}

/// Common-tail alignment of two series, keeping only pairs where both sides are finite.
pub(crate) fn aligned_pairs(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
  let n = x.len().min(y.len());
  x[x.len() - n..]
    .iter()
    .zip(y[y.len() - n..].iter())
    .filter(|(a, b)| a.is_finite() && b.is_finite())
    .map(|(&a, &b)| (a, b))
    .unzip()
}

/// Per-asset betas for every column of `returns`.
pub fn asset_betas(returns: &ReturnsMatrix, market: &[f64], min_observations: usize) -> Vec<Option<f64>> {
  returns
    .values()
    .columns()
    .into_iter()
    .map(|col| estimate_beta_with(&col.to_vec(), market, min_observations))
    .collect()
}

/// Weighted portfolio beta.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PortfolioBeta {
  /// `Σ w_i β_i` with unavailable betas counted as zero.
  pub value: f64,
  /// Set when at least one constituent beta was unavailable; treat `value` as approximate.
  pub approximate: bool,
  /// Number of constituents with a usable beta.
  pub available: usize,
}

impl PortfolioBeta {
  /// `None` when no constituent had a usable beta.
  pub fn as_option(&self) -> Option<f64> {
    (self.available > 0).then_some(self.value)
  }
}

/// `Σ w_i β_i`; an unavailable beta contributes zero and flags the result as approximate.
pub fn portfolio_beta(weights: &[f64], asset_betas: &[Option<f64>]) -> PortfolioBeta {
  let mut value = 0.0;
  let mut available = 0;
  let mut approximate = false;

  for (w, b) in weights.iter().zip(asset_betas.iter()) {
    match b {
      Some(b) => {
        value += w * b;
        available += 1;
      }
      None => approximate = true,
    }
  }

  PortfolioBeta {
    value,
    approximate,
    available,
  }
}
