//! # Portfolio Objectives
//!
//! $$
//! R(w) = P\,\mu^\top w,\quad
//! V(w) = \sqrt{P\,w^\top\Sigma w},\quad
//! S(w) = \frac{R(w)-r_f}{V(w)},\quad
//! B(w) = \beta^\top w
//! $$
//!
//! Every objective is phrased as a minimization with an analytic gradient.

use std::fmt;
use std::str::FromStr;

use argmin::core::CostFunction;
use argmin::core::Gradient;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use crate::error::FolioError;

const VOLATILITY_EPS: f64 = 1e-12;

/// Optimization goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Objective {
  MaxSharpe,
  MinVolatility,
  MaxReturn,
  MinBeta,
}

impl Objective {
  pub const ALL: [Objective; 4] = [
    Objective::MaxSharpe,
    Objective::MinVolatility,
    Objective::MaxReturn,
    Objective::MinBeta,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Objective::MaxSharpe => "max-sharpe",
      Objective::MinVolatility => "min-volatility",
      Objective::MaxReturn => "max-return",
      Objective::MinBeta => "min-beta",
    }
  }
}

impl fmt::Display for Objective {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Objective {
  type Err = FolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let key = s.trim().to_ascii_lowercase().replace('_', "-");
    Objective::ALL
      .into_iter()
      .find(|o| o.as_str() == key)
      .ok_or_else(|| FolioError::InvalidInput(format!("unknown objective: {s}")))
  }
}

/// Cost and gradient of one [`Objective`] over periodic moments.
#[derive(Clone, Debug)]
pub(crate) struct PortfolioObjective {
  pub objective: Objective,
  pub mean: Array1<f64>,
  pub cov: Array2<f64>,
  /// Unavailable betas enter as zero.
  pub betas: Array1<f64>,
  pub risk_free_rate: f64,
  pub periods_per_year: f64,
}

impl PortfolioObjective {
  pub fn annual_return(&self, w: ArrayView1<f64>) -> f64 {
    self.periods_per_year * self.mean.dot(&w)
  }

  pub fn annual_volatility(&self, w: ArrayView1<f64>) -> f64 {
    let var = self.periods_per_year * w.dot(&self.cov.dot(&w));
    var.max(0.0).sqrt()
  }

  pub fn sharpe(&self, w: ArrayView1<f64>) -> f64 {
    let vol = self.annual_volatility(w);
    if vol <= VOLATILITY_EPS {
      0.0
    } else {
      (self.annual_return(w) - self.risk_free_rate) / vol
    }
  }

  fn volatility_gradient(&self, w: ArrayView1<f64>, vol: f64) -> Array1<f64> {
    if vol <= VOLATILITY_EPS {
      return Array1::zeros(w.len());
    }
    self.cov.dot(&w) * (self.periods_per_year / vol)
  }
}

impl CostFunction for PortfolioObjective {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let w = ArrayView1::from(x.as_slice());
    Ok(match self.objective {
      Objective::MaxSharpe => -self.sharpe(w),
      Objective::MinVolatility => self.annual_volatility(w),
      Objective::MaxReturn => -self.annual_return(w),
      Objective::MinBeta => self.betas.dot(&w),
    })
  }
}

impl Gradient for PortfolioObjective {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    let w = ArrayView1::from(x.as_slice());
    let grad = match self.objective {
      Objective::MaxSharpe => {
        let vol = self.annual_volatility(w);
        if vol <= VOLATILITY_EPS {
          Array1::zeros(w.len())
        } else {
          let excess = self.annual_return(w) - self.risk_free_rate;
          let d_ret = &self.mean * self.periods_per_year;
          let d_vol = self.volatility_gradient(w, vol);
          -((d_ret * vol - d_vol * excess) / (vol * vol))
        }
      }
      Objective::MinVolatility => {
        let vol = self.annual_volatility(w);
        self.volatility_gradient(w, vol)
      }
      Objective::MaxReturn => &self.mean * -self.periods_per_year,
      Objective::MinBeta => self.betas.clone(),
    };
    Ok(grad.to_vec())
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn objective(kind: Objective) -> PortfolioObjective {
    PortfolioObjective {
      objective: kind,
      mean: array![0.001, 0.0005, 0.0002],
      cov: array![
        [0.0004, 0.0001, 0.0],
        [0.0001, 0.0002, 0.00005],
        [0.0, 0.00005, 0.0001]
      ],
      betas: array![1.2, 0.8, 0.3],
      risk_free_rate: 0.02,
      periods_per_year: 252.0,
    }
  }

  fn numeric_gradient(f: &PortfolioObjective, x: &[f64]) -> Vec<f64> {
    let h = 1e-7;
    (0..x.len())
      .map(|i| {
        let mut up = x.to_vec();
        let mut dn = x.to_vec();
        up[i] += h;
        dn[i] -= h;
        (f.cost(&up).unwrap() - f.cost(&dn).unwrap()) / (2.0 * h)
      })
      .collect()
  }

  #[test]
  fn analytic_gradients_match_finite_differences() {
    let x = vec![0.5, 0.3, 0.2];
    for kind in Objective::ALL {
      let f = objective(kind);
      let analytic = f.gradient(&x).unwrap();
      let numeric = numeric_gradient(&f, &x);
      for (a, n) in analytic.iter().zip(numeric.iter()) {
        assert_abs_diff_eq!(a, n, epsilon = 1e-5);
      }
    }
  }

  #[test]
  fn zero_volatility_sharpe_is_zero() {
    let mut f = objective(Objective::MaxSharpe);
    f.cov = Array2::zeros((3, 3));
    let x = vec![0.2, 0.3, 0.5];
    assert_eq!(f.cost(&x).unwrap(), 0.0);
    assert!(f.gradient(&x).unwrap().iter().all(|g| *g == 0.0));
  }

  #[test]
  fn parses_objective_names() {
    assert_eq!("max_sharpe".parse::<Objective>().unwrap(), Objective::MaxSharpe);
    assert_eq!("MIN-BETA".parse::<Objective>().unwrap(), Objective::MinBeta);
    assert!("balanced".parse::<Objective>().is_err());
  }
}
