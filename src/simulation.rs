//! # Monte Carlo Simulation
//!
//! $$
//! r_t \overset{iid}{\sim} \mathcal N(\mu_p, \sigma_p^2),\qquad
//! W_T = \prod_{t=1}^{T} (1 + r_t),\qquad
//! \mu_p = \mu^\top w,\ \sigma_p = \sqrt{w^\top\Sigma w}
//! $$
//!
//! Periodic (non-annualized) portfolio moments drive independent normal draws per
//! simulation and period. Paths start from unit wealth.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use ndarray_stats::interpolate::Linear;
use ndarray_stats::Quantile1dExt;
use noisy_float::types::n64;
use noisy_float::types::N64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use rayon::prelude::*;
use tracing::debug;

use crate::data::ReturnsMatrix;
use crate::data::WeightVector;
use crate::error::FolioError;
use crate::error::Result;

const LADDER: [f64; 5] = [0.05, 0.25, 0.50, 0.75, 0.95];

/// Simulation size and reproducibility settings.
#[derive(Clone, Debug, PartialEq)]
pub struct MonteCarloConfig {
  pub num_simulations: usize,
  /// Periods per path.
  pub horizon: usize,
  /// Path `i` draws from `StdRng::seed_from_u64(seed + i)`; `None` seeds from entropy.
  pub seed: Option<u64>,
  /// Keep the full wealth matrix instead of terminal values only.
  pub keep_paths: bool,
}

impl Default for MonteCarloConfig {
  fn default() -> Self {
    Self {
      num_simulations: 1000,
      horizon: 252,
      seed: None,
      keep_paths: false,
    }
  }
}

/// Terminal wealth percentiles.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PercentileLadder {
  pub p5: f64,
  pub p25: f64,
  pub p50: f64,
  pub p75: f64,
  pub p95: f64,
}

impl PercentileLadder {
  pub fn as_array(&self) -> [(u8, f64); 5] {
    [
      (5, self.p5),
      (25, self.p25),
      (50, self.p50),
      (75, self.p75),
      (95, self.p95),
    ]
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MonteCarloResult {
  /// Wealth paths, `num_simulations × horizon`, when requested.
  pub paths: Option<Array2<f64>>,
  pub terminal_values: Array1<f64>,
  pub percentiles: PercentileLadder,
  pub mean: f64,
  /// Population (ddof = 0) standard deviation of terminal values.
  pub std: f64,
  /// Share of paths ending below unit wealth.
  pub probability_of_loss: f64,
  pub periodic_mean: f64,
  pub periodic_std: f64,
}

impl MonteCarloResult {
  /// One-line summary of the terminal return distribution.
  pub fn commentary(&self) -> String {
    format!(
      "Monte Carlo simulation: Median return {:.2}%, 5th percentile {:.2}%, 95th percentile {:.2}%",
      (self.percentiles.p50 - 1.0) * 100.0,
      (self.percentiles.p5 - 1.0) * 100.0,
      (self.percentiles.p95 - 1.0) * 100.0
    )
  }
}

fn percentiles(values: &Array1<f64>) -> Result<PercentileLadder> {
  let mut noisy: Array1<N64> = values.mapv(n64);
  let qs: Array1<N64> = LADDER.iter().map(|&q| n64(q)).collect();
  let out = noisy
    .quantiles_mut(&qs, &Linear)
    .map_err(|e| FolioError::DegenerateInput(format!("terminal value quantiles: {e:?}")))?;

  Ok(PercentileLadder {
    p5: out[0].raw(),
    p25: out[1].raw(),
    p50: out[2].raw(),
    p75: out[3].raw(),
    p95: out[4].raw(),
  })
}

/// Simulate wealth paths for a portfolio with periodic mean `mu` and std `sigma`.
pub fn simulate_from_moments(mu: f64, sigma: f64, cfg: &MonteCarloConfig) -> Result<MonteCarloResult> {
  if cfg.num_simulations == 0 || cfg.horizon == 0 {
    return Err(FolioError::InvalidInput(
      "simulation count and horizon must be positive".to_string(),
    ));
  }
  let normal = Normal::new(mu, sigma)
    .map_err(|e| FolioError::DegenerateInput(format!("return distribution: {e}")))?;

  let paths: Vec<Array1<f64>> = (0..cfg.num_simulations)
    .into_par_iter()
    .map(|i| {
      let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
        None => StdRng::from_entropy(),
      };
      let mut wealth = Array1::random_using(cfg.horizon, normal, &mut rng);
      wealth.mapv_inplace(|r| 1.0 + r);
      wealth.accumulate_axis_inplace(Axis(0), |prev, curr| *curr *= *prev);
      wealth
    })
    .collect();

  let terminal_values: Array1<f64> = paths.iter().map(|p| p[cfg.horizon - 1]).collect();
  if terminal_values.iter().any(|v| !v.is_finite()) {
    return Err(FolioError::DegenerateInput(
      "non-finite simulated wealth".to_string(),
    ));
  }

  let n = terminal_values.len() as f64;
  let mean = terminal_values.sum() / n;
  let std = terminal_values.std(0.0);
  let probability_of_loss = terminal_values.iter().filter(|&&v| v < 1.0).count() as f64 / n;
  let percentiles = percentiles(&terminal_values)?;

  let paths = if cfg.keep_paths {
    let mut m = Array2::<f64>::zeros((cfg.num_simulations, cfg.horizon));
    for (mut row, path) in m.rows_mut().into_iter().zip(paths.iter()) {
      row.assign(path);
    }
    Some(m)
  } else {
    None
  };

  debug!(
    simulations = cfg.num_simulations,
    horizon = cfg.horizon,
    mean,
    std,
    "monte carlo finished"
  );

  Ok(MonteCarloResult {
    paths,
    terminal_values,
    percentiles,
    mean,
    std,
    probability_of_loss,
    periodic_mean: mu,
    periodic_std: sigma,
  })
}

/// Simulate the weighted portfolio built from `returns`.
///
/// Weights are aligned to the matrix symbols; held symbols without history count as zero.
pub fn simulate(
  returns: &ReturnsMatrix,
  weights: &WeightVector,
  cfg: &MonteCarloConfig,
) -> Result<MonteCarloResult> {
  let w = weights.aligned_to(returns.symbols());
  if w.iter().all(|v| *v == 0.0) {
    return Err(FolioError::InvalidInput(
      "no weighted symbol has return history".to_string(),
    ));
  }

  let cov = returns.covariance()?;
  let mu = returns.mean_returns().dot(&w);
  let var = w.dot(&cov.dot(&w));
  let sigma = var.max(0.0).sqrt();

  simulate_from_moments(mu, sigma, cfg)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn seeded(n: usize, horizon: usize) -> MonteCarloConfig {
    MonteCarloConfig {
      num_simulations: n,
      horizon,
      seed: Some(42),
      keep_paths: true,
    }
  }

  #[test]
  fn seeded_runs_are_reproducible() {
    let a = simulate_from_moments(0.0005, 0.01, &seeded(200, 50)).unwrap();
    let b = simulate_from_moments(0.0005, 0.01, &seeded(200, 50)).unwrap();
    assert_eq!(a.terminal_values, b.terminal_values);
    assert_eq!(a.percentiles, b.percentiles);
  }

  #[test]
  fn zero_volatility_paths_are_deterministic() {
    let res = simulate_from_moments(0.01, 0.0, &seeded(10, 3)).unwrap();
    let expected = 1.01_f64.powi(3);
    for v in res.terminal_values.iter() {
      assert_abs_diff_eq!(*v, expected, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(res.std, 0.0, epsilon = 1e-12);
    assert_eq!(res.probability_of_loss, 0.0);
    assert_eq!(
      res.commentary(),
      "Monte Carlo simulation: Median return 3.03%, 5th percentile 3.03%, 95th percentile 3.03%"
    );
  }

  #[test]
  fn ladder_is_monotone_and_paths_end_at_terminal() {
    let res = simulate_from_moments(0.0003, 0.012, &seeded(500, 20)).unwrap();
    let p = res.percentiles;
    assert!(p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95);

    let paths = res.paths.unwrap();
    assert_eq!(paths.dim(), (500, 20));
    assert_eq!(paths.column(19).to_owned(), res.terminal_values);
  }

  #[test]
  fn percentiles_interpolate_linearly() {
    let values = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let p = percentiles(&values).unwrap();
    assert_abs_diff_eq!(p.p5, 1.2, epsilon = 1e-12);
    assert_abs_diff_eq!(p.p50, 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(p.p95, 4.8, epsilon = 1e-12);
  }

  #[test]
  fn rejects_empty_runs() {
    assert!(simulate_from_moments(0.0, 0.01, &seeded(0, 10)).is_err());
    assert!(simulate_from_moments(0.0, 0.01, &seeded(10, 0)).is_err());
  }

  #[test]
  fn portfolio_moments_come_from_weights() {
    let returns =
      ReturnsMatrix::from_columns(&["A", "B"], &[vec![0.01, 0.03, 0.02], vec![0.0, 0.0, 0.0]])
        .unwrap();
    let weights = WeightVector::from_pairs(&[("A", 0.5), ("B", 0.5)]).unwrap();
    let res = simulate(&returns, &weights, &seeded(10, 5)).unwrap();

    assert_abs_diff_eq!(res.periodic_mean, 0.01, epsilon = 1e-12);
    // var(A) = 1e-4, weighted by 0.25
    assert_abs_diff_eq!(res.periodic_std, 0.005, epsilon = 1e-12);
  }
}
