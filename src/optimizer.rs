//! # Portfolio Optimizer
//!
//! $$
//! \min_{w}\ f(w)\quad\text{s.t.}\quad \mathbf 1^\top w = 1,\ 0 \le w_i \le 1
//! $$
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`objective`] | Closed set of objectives with analytic gradients. |
//! | [`sqp`] | Sequential quadratic programming driver and its settings. |
//!
//! Moments are periodic; annualization multiplies the mean by `P` and the variance by `P`.

pub mod objective;
mod qp;
pub mod sqp;

use std::fmt;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use tracing::debug;
use tracing::warn;

pub use objective::Objective;
pub(crate) use objective::PortfolioObjective;
pub use sqp::SqpConfig;
pub(crate) use sqp::LinearConstraints;

use crate::beta::asset_betas;
use crate::beta::portfolio_beta;
use crate::beta::MIN_BETA_OBSERVATIONS;
use crate::data::ReturnsMatrix;
use crate::data::WeightVector;
use crate::error::FolioError;
use crate::error::Result;

/// Settings shared by [`optimize`] and the frontier sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
  /// Annual rate, not de-annualized.
  pub risk_free_rate: f64,
  pub periods_per_year: f64,
  pub beta_min_observations: usize,
  pub solver: SqpConfig,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.06,
      periods_per_year: 252.0,
      beta_min_observations: MIN_BETA_OBSERVATIONS,
      solver: SqpConfig::default(),
    }
  }
}

/// Annualized figures of one weight vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PortfolioMetrics {
  pub annual_return: f64,
  pub annual_volatility: f64,
  pub sharpe: f64,
  pub beta: Option<f64>,
  /// At least one constituent beta was unavailable and counted as zero.
  pub beta_approximate: bool,
}

/// Successful optimization payload.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizedPortfolio {
  pub objective: Objective,
  pub weights: WeightVector,
  pub metrics: PortfolioMetrics,
  pub iterations: usize,
  pub message: String,
}

/// Tagged outcome; non-convergence is a value, not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizationResult {
  Optimized(OptimizedPortfolio),
  Failed { message: String },
}

impl OptimizationResult {
  pub fn is_success(&self) -> bool {
    matches!(self, OptimizationResult::Optimized(_))
  }

  pub fn optimized(&self) -> Option<&OptimizedPortfolio> {
    match self {
      OptimizationResult::Optimized(p) => Some(p),
      OptimizationResult::Failed { .. } => None,
    }
  }

  pub fn weights(&self) -> Option<&WeightVector> {
    self.optimized().map(|p| &p.weights)
  }

  pub fn metrics(&self) -> Option<&PortfolioMetrics> {
    self.optimized().map(|p| &p.metrics)
  }

  pub fn message(&self) -> &str {
    match self {
      OptimizationResult::Optimized(p) => &p.message,
      OptimizationResult::Failed { message } => message,
    }
  }

  /// One-line summary suitable for a result sink.
  pub fn commentary(&self) -> String {
    match self {
      OptimizationResult::Optimized(p) => {
        let beta = p
          .metrics
          .beta
          .map(|b| format!("{b:.2}"))
          .unwrap_or_else(|| "N/A".to_string());
        format!(
          "Optimized portfolio: Return {:.2}%, Volatility {:.2}%, Sharpe {:.2}, Beta {}",
          p.metrics.annual_return * 100.0,
          p.metrics.annual_volatility * 100.0,
          p.metrics.sharpe,
          beta
        )
      }
      OptimizationResult::Failed { message } => format!("Optimization failed: {message}"),
    }
  }

  fn failed(message: impl Into<String>) -> Self {
    OptimizationResult::Failed {
      message: message.into(),
    }
  }
}

impl fmt::Display for OptimizationResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.commentary())
  }
}

/// Periodic moments and betas of a universe, ready for optimization.
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioModel {
  symbols: Vec<String>,
  mean: Array1<f64>,
  cov: Array2<f64>,
  betas: Vec<Option<f64>>,
  risk_free_rate: f64,
  periods_per_year: f64,
}

impl PortfolioModel {
  /// Estimate moments from `returns`, and betas when a market series is supplied.
  pub fn estimate(
    returns: &ReturnsMatrix,
    market: Option<&[f64]>,
    cfg: &OptimizerConfig,
  ) -> Result<Self> {
    let cov = returns.covariance()?;
    let betas = match market {
      Some(m) => asset_betas(returns, m, cfg.beta_min_observations),
      None => vec![None; returns.n_assets()],
    };

    Self::from_moments(
      returns.symbols(),
      returns.mean_returns(),
      cov,
      betas,
      cfg.risk_free_rate,
      cfg.periods_per_year,
    )
  }

  /// Build from precomputed periodic moments.
  pub fn from_moments<S: AsRef<str>>(
    symbols: &[S],
    mean: Array1<f64>,
    cov: Array2<f64>,
    betas: Vec<Option<f64>>,
    risk_free_rate: f64,
    periods_per_year: f64,
  ) -> Result<Self> {
    let n = symbols.len();
    if n == 0 {
      return Err(FolioError::insufficient(1, 0, "assets"));
    }
    if mean.len() != n || cov.dim() != (n, n) || betas.len() != n {
      return Err(FolioError::InvalidInput(format!(
        "moment shapes do not match {n} symbols"
      )));
    }
    if mean.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
      return Err(FolioError::DegenerateInput(
        "non-finite mean or covariance".to_string(),
      ));
    }
    if !(periods_per_year > 0.0) || !risk_free_rate.is_finite() {
      return Err(FolioError::InvalidInput(
        "periods per year must be positive and the risk-free rate finite".to_string(),
      ));
    }

    Ok(Self {
      symbols: symbols.iter().map(|s| s.as_ref().to_string()).collect(),
      mean,
      cov,
      betas,
      risk_free_rate,
      periods_per_year,
    })
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn mean(&self) -> &Array1<f64> {
    &self.mean
  }

  pub fn cov(&self) -> &Array2<f64> {
    &self.cov
  }

  pub fn betas(&self) -> &[Option<f64>] {
    &self.betas
  }

  pub fn risk_free_rate(&self) -> f64 {
    self.risk_free_rate
  }

  pub fn periods_per_year(&self) -> f64 {
    self.periods_per_year
  }

  /// Per-asset annualized mean returns.
  pub fn annual_returns(&self) -> Array1<f64> {
    &self.mean * self.periods_per_year
  }

  pub(crate) fn objective(&self, objective: Objective) -> PortfolioObjective {
    PortfolioObjective {
      objective,
      mean: self.mean.clone(),
      cov: self.cov.clone(),
      betas: self.betas.iter().map(|b| b.unwrap_or(0.0)).collect(),
      risk_free_rate: self.risk_free_rate,
      periods_per_year: self.periods_per_year,
    }
  }

  /// Annualized return, volatility, Sharpe and beta of `weights`.
  pub fn metrics(&self, weights: &[f64]) -> PortfolioMetrics {
    let f = self.objective(Objective::MinVolatility);
    let w = ArrayView1::from(weights);
    let beta = portfolio_beta(weights, &self.betas);

    PortfolioMetrics {
      annual_return: f.annual_return(w),
      annual_volatility: f.annual_volatility(w),
      sharpe: f.sharpe(w),
      beta: beta.as_option(),
      beta_approximate: beta.approximate,
    }
  }

  /// Optimize `objective` under the budget and long-only bounds.
  pub fn solve(&self, objective: Objective, cfg: &SqpConfig) -> OptimizationResult {
    self.solve_with(objective, LinearConstraints::budget(self.symbols.len()), cfg)
  }

  pub(crate) fn solve_with(
    &self,
    objective: Objective,
    constraints: LinearConstraints,
    cfg: &SqpConfig,
  ) -> OptimizationResult {
    let n = self.symbols.len();

    if n == 1 && constraints.a_eq.nrows() == 1 {
      return self.finish(objective, vec![1.0], 0, sqp::MSG_SUCCESS);
    }

    let problem = self.objective(objective);
    let x0 = vec![1.0 / n as f64; n];
    let out = sqp::minimize(&problem, &x0, &constraints, cfg);

    if !out.success {
      warn!(%objective, iterations = out.iterations, message = %out.message, "optimization failed");
      return OptimizationResult::failed(out.message);
    }
    if !out.fun.is_finite() {
      return OptimizationResult::failed(sqp::MSG_NON_FINITE);
    }

    debug!(%objective, iterations = out.iterations, fun = out.fun, "optimization converged");
    self.finish(objective, out.x, out.iterations, &out.message)
  }

  /// Clip to `[0, 1]`, renormalize and attach metrics.
  fn finish(
    &self,
    objective: Objective,
    raw: Vec<f64>,
    iterations: usize,
    message: &str,
  ) -> OptimizationResult {
    let mut w = Array1::from(raw).mapv(|v| v.clamp(0.0, 1.0));
    let total = w.sum();
    if !(total > 0.0) || !total.is_finite() {
      return OptimizationResult::failed(sqp::MSG_NON_FINITE);
    }
    w /= total;

    let metrics = self.metrics(w.as_slice().unwrap_or(&[]));
    if !metrics.annual_return.is_finite() || !metrics.annual_volatility.is_finite() {
      return OptimizationResult::failed(sqp::MSG_NON_FINITE);
    }

    OptimizationResult::Optimized(OptimizedPortfolio {
      objective,
      weights: WeightVector::from_array(&self.symbols, w),
      metrics,
      iterations,
      message: message.to_string(),
    })
  }
}

/// Optimize long-only, fully invested weights for `objective`.
///
/// Preprocessing errors such as too few periods come back as
/// [`OptimizationResult::Failed`] carrying the error text.
pub fn optimize(
  returns: &ReturnsMatrix,
  objective: Objective,
  market: Option<&[f64]>,
  cfg: &OptimizerConfig,
) -> OptimizationResult {
  match PortfolioModel::estimate(returns, market, cfg) {
    Ok(model) => {
      if objective == Objective::MinBeta && model.betas.iter().all(Option::is_none) {
        warn!("no asset beta available, minimum-beta objective is flat");
      }
      model.solve(objective, &cfg.solver)
    }
    Err(e) => {
      warn!(%objective, error = %e, "optimization input rejected");
      OptimizationResult::failed(e.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;
  use tracing_test::traced_test;

  use super::*;

  fn synthetic_returns(seed: u64) -> ReturnsMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let params = [(0.0008, 0.02), (0.0004, 0.01), (0.0002, 0.006), (0.0006, 0.015)];
    let columns: Vec<Vec<f64>> = params
      .iter()
      .map(|&(mu, sigma)| {
        let normal = Normal::new(mu, sigma).unwrap();
        (0..250).map(|_| normal.sample(&mut rng)).collect()
      })
      .collect();
    ReturnsMatrix::from_columns(&["A", "B", "C", "D"], &columns).unwrap()
  }

  fn market_for(returns: &ReturnsMatrix) -> Vec<f64> {
    returns
      .values()
      .rows()
      .into_iter()
      .map(|r| r.mean().unwrap_or(0.0))
      .collect()
  }

  #[test]
  fn every_objective_respects_budget_and_bounds() {
    let returns = synthetic_returns(11);
    let market = market_for(&returns);
    let cfg = OptimizerConfig::default();

    for objective in Objective::ALL {
      let res = optimize(&returns, objective, Some(&market), &cfg);
      let weights = res.weights().unwrap_or_else(|| panic!("{objective}: {}", res.message()));
      assert!((weights.sum() - 1.0).abs() < 1e-4, "{objective}");
      assert!(weights.weights().iter().all(|w| (0.0..=1.0).contains(w)), "{objective}");
    }
  }

  #[test]
  fn single_asset_gets_full_weight() {
    let returns = ReturnsMatrix::from_columns(&["ONLY"], &[vec![0.01, -0.02, 0.005, 0.0]]).unwrap();
    for objective in Objective::ALL {
      let res = optimize(&returns, objective, None, &OptimizerConfig::default());
      assert_eq!(res.weights().unwrap().get("ONLY"), Some(1.0));
    }
  }

  #[test]
  fn identical_uncorrelated_assets_split_evenly_for_max_sharpe() {
    let model = PortfolioModel::from_moments(
      &["X", "Y"],
      array![0.0005, 0.0005],
      array![[0.0001, 0.0], [0.0, 0.0001]],
      vec![None, None],
      0.0,
      252.0,
    )
    .unwrap();

    let res = model.solve(Objective::MaxSharpe, &SqpConfig::default());
    let w = res.weights().unwrap();
    assert_abs_diff_eq!(w.get("X").unwrap(), 0.5, epsilon = 1e-4);
    assert_abs_diff_eq!(w.get("Y").unwrap(), 0.5, epsilon = 1e-4);
  }

  #[test]
  fn equal_weight_volatility_matches_closed_form() {
    let model = PortfolioModel::from_moments(
      &["A", "B", "C"],
      array![0.01, 0.02, -0.01],
      Array2::from_diag(&array![0.0004, 0.0009, 0.0001]),
      vec![None; 3],
      0.06,
      252.0,
    )
    .unwrap();

    let m = model.metrics(&[1.0 / 3.0; 3]);
    let expected = ((0.0004 + 0.0009 + 0.0001) / 9.0 * 252.0_f64).sqrt();
    assert_abs_diff_eq!(m.annual_volatility, expected, epsilon = 1e-6);
    assert_abs_diff_eq!(m.annual_return, 0.02 / 3.0 * 252.0, epsilon = 1e-12);
    assert_eq!(m.beta, None);
  }

  #[test]
  fn max_return_concentrates_in_best_asset() {
    let model = PortfolioModel::from_moments(
      &["A", "B", "C"],
      array![0.01, 0.02, -0.01],
      Array2::from_diag(&array![0.0004, 0.0009, 0.0001]),
      vec![None; 3],
      0.06,
      252.0,
    )
    .unwrap();

    let res = model.solve(Objective::MaxReturn, &SqpConfig::default());
    assert_abs_diff_eq!(res.weights().unwrap().get("B").unwrap(), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn min_volatility_beats_equal_weight() {
    let returns = synthetic_returns(2);
    let cfg = OptimizerConfig::default();
    let model = PortfolioModel::estimate(&returns, None, &cfg).unwrap();

    let res = model.solve(Objective::MinVolatility, &cfg.solver);
    let optimized = res.metrics().unwrap().annual_volatility;
    let equal = model.metrics(&[0.25; 4]).annual_volatility;
    assert!(optimized <= equal + 1e-9, "{optimized} > {equal}");
  }

  #[test]
  #[traced_test]
  fn short_history_is_a_failed_result() {
    let returns = ReturnsMatrix::from_columns(&["A", "B"], &[vec![0.01], vec![0.02]]).unwrap();
    let res = optimize(&returns, Objective::MaxSharpe, None, &OptimizerConfig::default());
    assert!(!res.is_success());
    assert!(res.message().contains("Insufficient data"));
    assert!(logs_contain("optimization input rejected"));
  }

  #[test]
  fn commentary_reports_missing_beta() {
    let model = PortfolioModel::from_moments(
      &["A", "B"],
      array![0.001, 0.0005],
      array![[0.0004, 0.0], [0.0, 0.0001]],
      vec![Some(1.2), None],
      0.06,
      252.0,
    )
    .unwrap();
    let res = model.solve(Objective::MinVolatility, &SqpConfig::default());
    let text = res.commentary();
    assert!(text.starts_with("Optimized portfolio: Return "));
    assert!(res.metrics().unwrap().beta_approximate);
    assert!(!text.contains("N/A"));
  }
}
