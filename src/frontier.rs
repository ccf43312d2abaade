//! # Efficient Frontier
//!
//! $$
//! \sigma^*(\bar r) = \min_w \sqrt{P\,w^\top\Sigma w}
//! \quad\text{s.t.}\quad P\,\mu^\top w = \bar r,\ \mathbf 1^\top w = 1,\ 0\le w\le 1
//! $$
//!
//! Targets are spaced linearly between the lowest and highest annualized asset mean.
//! Points whose solve fails are omitted.

use ndarray::Array1;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use crate::data::ReturnsMatrix;
use crate::data::WeightVector;
use crate::error::Result;
use crate::optimizer::LinearConstraints;
use crate::optimizer::Objective;
use crate::optimizer::OptimizationResult;
use crate::optimizer::OptimizerConfig;
use crate::optimizer::PortfolioModel;

/// One minimum-volatility portfolio on the frontier.
#[derive(Clone, Debug, PartialEq)]
pub struct EfficientFrontierPoint {
  pub target_return: f64,
  pub volatility: f64,
  /// `(target - r_f) / volatility`, zero for a riskless point.
  pub sharpe: f64,
  pub beta: Option<f64>,
  pub weights: WeightVector,
}

impl EfficientFrontierPoint {
  /// One-line summary stored alongside the point's weights.
  pub fn commentary(&self) -> String {
    let beta = self
      .beta
      .map(|b| format!("{b:.2}"))
      .unwrap_or_else(|| "N/A".to_string());
    format!(
      "Efficient frontier point: Return {:.2}%, Volatility {:.2}%, Sharpe {:.2}, Beta {}",
      self.target_return * 100.0,
      self.volatility * 100.0,
      self.sharpe,
      beta
    )
  }
}

/// `n` evenly spaced values on `[lo, hi]`.
fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
  match n {
    0 => Vec::new(),
    1 => vec![lo],
    _ => Array1::linspace(lo, hi, n).to_vec(),
  }
}

/// Frontier points from an estimated model, ascending in target return.
pub fn frontier_from_model(
  model: &PortfolioModel,
  num_points: usize,
  cfg: &OptimizerConfig,
) -> Vec<EfficientFrontierPoint> {
  let annual = model.annual_returns();
  let lo = annual.iter().copied().fold(f64::INFINITY, f64::min);
  let hi = annual.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  // every portfolio earns the same return when the asset means coincide
  let flat = hi <= lo;
  let targets = linspace(lo, hi, if flat { num_points.min(1) } else { num_points });
  let row = annual.to_vec();

  let points: Vec<EfficientFrontierPoint> = targets
    .into_par_iter()
    .filter_map(|target| {
      let constraints = if flat {
        LinearConstraints::budget(row.len())
      } else {
        LinearConstraints::budget(row.len()).with_equality(&row, target)
      };
      match model.solve_with(Objective::MinVolatility, constraints, &cfg.solver) {
        OptimizationResult::Optimized(p) => {
          let volatility = p.metrics.annual_volatility;
          let sharpe = if volatility > 0.0 {
            (target - model.risk_free_rate()) / volatility
          } else {
            0.0
          };
          Some(EfficientFrontierPoint {
            target_return: target,
            volatility,
            sharpe,
            beta: p.metrics.beta,
            weights: p.weights,
          })
        }
        OptimizationResult::Failed { message } => {
          warn!(target, %message, "skipping frontier point");
          None
        }
      }
    })
    .collect();

  debug!(requested = num_points, solved = points.len(), "frontier generated");
  points
}

/// Efficient frontier of `returns` with `num_points` targets.
pub fn generate_frontier(
  returns: &ReturnsMatrix,
  num_points: usize,
  market: Option<&[f64]>,
  cfg: &OptimizerConfig,
) -> Result<Vec<EfficientFrontierPoint>> {
  let model = PortfolioModel::estimate(returns, market, cfg)?;
  Ok(frontier_from_model(&model, num_points, cfg))
}
