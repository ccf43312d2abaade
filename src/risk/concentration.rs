//! # Correlation & Concentration
//!
//! $$
//! \bar\rho = \frac{2}{N(N-1)}\sum_{i<j}\rho_{ij},\qquad
//! \mathrm{HHI} = \sum_i w_i^2,\qquad D = \frac{1}{\mathrm{HHI}}
//! $$
//!

use std::fmt::Display;

use ndarray::Array2;

use crate::data::ReturnsMatrix;
use crate::data::WeightVector;

/// Average pairwise correlation above which correlation risk is high.
pub const HIGH_CORRELATION: f64 = 0.7;
/// Average pairwise correlation above which correlation risk is medium.
pub const MEDIUM_CORRELATION: f64 = 0.4;
/// HHI above which concentration risk is high.
pub const HIGH_CONCENTRATION: f64 = 0.25;
/// HHI above which concentration risk is medium.
pub const MEDIUM_CONCENTRATION: f64 = 0.15;

/// Qualitative risk bucket.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum RiskLevel {
  #[default]
  Low,
  Medium,
  High,
}

impl RiskLevel {
  /// `High` above `high`, `Medium` above `medium`, else `Low`.
  pub fn classify(value: f64, high: f64, medium: f64) -> Self {
    if value > high {
      RiskLevel::High
    } else if value > medium {
      RiskLevel::Medium
    } else {
      RiskLevel::Low
    }
  }
}

impl Display for RiskLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RiskLevel::Low => write!(f, "Low"),
      RiskLevel::Medium => write!(f, "Medium"),
      RiskLevel::High => write!(f, "High"),
    }
  }
}

/// Herfindahl concentration of a weight vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Concentration {
  pub hhi: f64,
  pub level: RiskLevel,
  /// `1 / HHI`; `None` when every weight is zero.
  pub diversification_ratio: Option<f64>,
}

/// HHI, its risk bucket and the diversification ratio.
pub fn concentration(weights: &WeightVector) -> Concentration {
  let hhi = weights.hhi();
  Concentration {
    hhi,
    level: RiskLevel::classify(hhi, HIGH_CONCENTRATION, MEDIUM_CONCENTRATION),
    diversification_ratio: (hhi > 0.0).then(|| 1.0 / hhi),
  }
}

/// Correlation structure and concentration of the held constituents.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationRisk {
  /// Held symbols with return history, in the order of the matrix rows.
  pub symbols: Vec<String>,
  pub correlation: Array2<f64>,
  pub average_correlation: f64,
  pub correlation_level: RiskLevel,
  pub concentration: Concentration,
}

/// Correlation and concentration risk over symbols both held and present in `returns`.
///
/// `None` when fewer than two such symbols exist.
pub fn correlation_risk(returns: &ReturnsMatrix, weights: &WeightVector) -> Option<CorrelationRisk> {
  let held: Vec<&str> = weights
    .symbols()
    .iter()
    .map(String::as_str)
    .filter(|s| returns.index_of(s).is_some())
    .collect();

  if held.len() < 2 {
    return None;
  }

  let sub = returns.select(&held).ok()?;
  let corr = sub.correlation();
  let n = held.len();

  let mut sum = 0.0;
  let mut pairs = 0usize;
  for i in 0..n {
    for j in (i + 1)..n {
      sum += corr[[i, j]];
      pairs += 1;
    }
  }
  let average_correlation = sum / pairs as f64;

  // held weights are kept as they are, not renormalized over the sub-universe
  let held_symbols: Vec<String> = held.iter().map(|s| s.to_string()).collect();
  let held_vector = WeightVector::from_array(&held_symbols, weights.aligned_to(&held_symbols));

  Some(CorrelationRisk {
    symbols: held_symbols,
    correlation: corr,
    average_correlation,
    correlation_level: RiskLevel::classify(average_correlation, HIGH_CORRELATION, MEDIUM_CORRELATION),
    concentration: concentration(&held_vector),
  })
}
