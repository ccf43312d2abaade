//! # Weights
//!
//! $$
//! \sum_i w_i = 1,\qquad 0 \le w_i \le 1
//! $$
//!
//! Symbol-keyed weight vectors and raw holdings.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use impl_new_derive::ImplNew;
use ndarray::Array1;

use crate::error::FolioError;
use crate::error::Result;

/// Tolerance used when checking the budget constraint of a weight vector.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// Portfolio weights keyed by symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightVector {
  symbols: Vec<String>,
  weights: Array1<f64>,
}

impl WeightVector {
  /// Build a weight vector. Symbols must be unique and the weights a long-only budget:
  /// each in `[0, 1]`, summing to one within [`WEIGHT_SUM_TOLERANCE`].
  pub fn new<S: AsRef<str>>(symbols: &[S], weights: Vec<f64>) -> Result<Self> {
    if symbols.len() != weights.len() {
      return Err(FolioError::InvalidInput(format!(
        "{} symbols for {} weights",
        symbols.len(),
        weights.len()
      )));
    }
    if weights.iter().any(|w| !w.is_finite()) {
      return Err(FolioError::InvalidInput("non-finite weight".to_string()));
    }

    let mut seen = BTreeSet::new();
    for s in symbols {
      if !seen.insert(s.as_ref()) {
        return Err(FolioError::InvalidInput(format!(
          "duplicate symbol {}",
          s.as_ref()
        )));
      }
    }

    let vector = Self {
      symbols: symbols.iter().map(|s| s.as_ref().to_string()).collect(),
      weights: Array1::from(weights),
    };
    if !vector.is_long_only_budget(WEIGHT_SUM_TOLERANCE) {
      return Err(FolioError::InvalidInput(format!(
        "weights must lie in [0, 1] and sum to 1, got sum {:.6}",
        vector.sum()
      )));
    }

    Ok(vector)
  }

  /// `1/N` for every symbol.
  pub fn equal<S: AsRef<str>>(symbols: &[S]) -> Self {
    let n = symbols.len();
    Self {
      symbols: symbols.iter().map(|s| s.as_ref().to_string()).collect(),
      weights: Array1::from_elem(n, if n == 0 { 0.0 } else { 1.0 / n as f64 }),
    }
  }

  pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, f64)]) -> Result<Self> {
    let symbols: Vec<&str> = pairs.iter().map(|(s, _)| s.as_ref()).collect();
    let weights = pairs.iter().map(|&(_, w)| w).collect();
    Self::new(&symbols, weights)
  }

  /// Unchecked constructor for sub-portfolios and already-projected solver output.
  pub(crate) fn from_array(symbols: &[String], weights: Array1<f64>) -> Self {
    Self {
      symbols: symbols.to_vec(),
      weights,
    }
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn weights(&self) -> &Array1<f64> {
    &self.weights
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  pub fn get(&self, symbol: &str) -> Option<f64> {
    self
      .symbols
      .iter()
      .position(|s| s == symbol)
      .map(|i| self.weights[i])
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .symbols
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }

  pub fn to_map(&self) -> BTreeMap<String, f64> {
    self.iter().map(|(s, w)| (s.to_string(), w)).collect()
  }

  pub fn sum(&self) -> f64 {
    self.weights.sum()
  }

  /// Herfindahl-Hirschman index `Σ w_i²`.
  pub fn hhi(&self) -> f64 {
    self.weights.iter().map(|w| w * w).sum()
  }

  /// Weights re-ordered to `symbols`; symbols this vector does not hold get zero.
  pub fn aligned_to(&self, symbols: &[String]) -> Array1<f64> {
    symbols
      .iter()
      .map(|s| self.get(s).unwrap_or(0.0))
      .collect()
  }

  /// Long-only budget invariant: every weight in `[0, 1]` and the sum within `tol` of one.
  pub fn is_long_only_budget(&self, tol: f64) -> bool {
    (self.sum() - 1.0).abs() < tol
      && self
        .weights
        .iter()
        .all(|&w| (-tol..=1.0 + tol).contains(&w))
  }
}

/// A position in a live portfolio.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct Holding {
  pub symbol: String,
  pub market_value: f64,
}
