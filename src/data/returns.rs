//! # Returns Matrix
//!
//! $$
//! r_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1,\qquad
//! \Sigma_{ij} = \frac{1}{T-1}\sum_t (r_{t,i}-\bar r_i)(r_{t,j}-\bar r_j)
//! $$
//!
//! Conversion of per-asset price histories into an aligned periodic-return matrix,
//! plus the covariance and correlation estimators everything downstream relies on.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use super::price::PriceSeries;
use super::weights::WeightVector;
use crate::error::FolioError;
use crate::error::Result;

/// Minimum number of overlapping price periods.
pub const MIN_PRICE_PERIODS: usize = 2;

/// Minimum number of return rows needed for a sample covariance.
pub const MIN_RETURN_PERIODS: usize = 2;

fn sample_mean(xs: ArrayView1<f64>) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.sum() / xs.len() as f64
  }
}

/// Pearson correlation of two equally long series.
///
/// Zero-variance inputs have no defined correlation; they are reported as `0.0`.
pub(crate) fn pearson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  let n = x.len().min(y.len());
  if n < 2 {
    return 0.0;
  }

  let mx = sample_mean(x);
  let my = sample_mean(y);

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;

  for i in 0..n {
    let dx = x[i] - mx;
    let dy = y[i] - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
  }

  let denom = (sx * sy).sqrt();
  if denom < 1e-15 {
    0.0
  } else {
    (cov / denom).clamp(-1.0, 1.0)
  }
}

/// T periods × N assets of simple periodic returns.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnsMatrix {
  symbols: Vec<String>,
  timestamps: Vec<DateTime<Utc>>,
  values: Array2<f64>,
}

impl ReturnsMatrix {
  /// Build returns from price histories.
  ///
  /// Assets are inner-joined on timestamp: only periods present for every series are kept.
  pub fn from_prices(series: &[PriceSeries]) -> Result<Self> {
    if series.is_empty() {
      return Err(FolioError::insufficient(1, 0, "price series"));
    }

    let mut seen = BTreeSet::new();
    for s in series {
      if !seen.insert(s.symbol.as_str()) {
        return Err(FolioError::InvalidInput(format!(
          "duplicate symbol {}",
          s.symbol
        )));
      }
    }

    let closes: Vec<BTreeMap<DateTime<Utc>, f64>> = series
      .iter()
      .map(|s| s.bars.iter().map(|b| (b.timestamp, b.close)).collect())
      .collect();

    let mut common: BTreeSet<DateTime<Utc>> = closes[0].keys().copied().collect();
    for by_ts in &closes[1..] {
      common.retain(|ts| by_ts.contains_key(ts));
    }

    if common.len() < MIN_PRICE_PERIODS {
      return Err(FolioError::insufficient(
        MIN_PRICE_PERIODS,
        common.len(),
        "overlapping price periods",
      ));
    }

    let stamps: Vec<DateTime<Utc>> = common.into_iter().collect();
    let n = series.len();
    let mut values = Array2::<f64>::zeros((stamps.len() - 1, n));

    for (j, by_ts) in closes.iter().enumerate() {
      let mut prev = by_ts[&stamps[0]];
      for (t, ts) in stamps.iter().enumerate().skip(1) {
        let cur = by_ts[ts];
        if !(prev > 0.0 && prev.is_finite() && cur.is_finite()) {
          return Err(FolioError::DegenerateInput(format!(
            "non-positive or non-finite price for {} at {}",
            series[j].symbol, ts
          )));
        }
        values[[t - 1, j]] = cur / prev - 1.0;
        prev = cur;
      }
    }

    Ok(Self {
      symbols: series.iter().map(|s| s.symbol.clone()).collect(),
      timestamps: stamps[1..].to_vec(),
      values,
    })
  }

  /// Build from pre-computed return columns (one `Vec` per asset).
  ///
  /// Periods are stamped as consecutive days from the Unix epoch.
  pub fn from_columns<S: AsRef<str>>(symbols: &[S], columns: &[Vec<f64>]) -> Result<Self> {
    if symbols.is_empty() || symbols.len() != columns.len() {
      return Err(FolioError::InvalidInput(format!(
        "{} symbols for {} return columns",
        symbols.len(),
        columns.len()
      )));
    }

    let t = columns[0].len();
    if columns.iter().any(|c| c.len() != t) {
      return Err(FolioError::InvalidInput(
        "return columns have different lengths".to_string(),
      ));
    }
    if t == 0 {
      return Err(FolioError::insufficient(1, 0, "return periods"));
    }
    if columns.iter().flatten().any(|r| !r.is_finite()) {
      return Err(FolioError::DegenerateInput(
        "non-finite periodic return".to_string(),
      ));
    }

    let mut values = Array2::<f64>::zeros((t, columns.len()));
    for (j, col) in columns.iter().enumerate() {
      for (i, &r) in col.iter().enumerate() {
        values[[i, j]] = r;
      }
    }

    Ok(Self {
      symbols: symbols.iter().map(|s| s.as_ref().to_string()).collect(),
      timestamps: (0..t)
        .map(|i| DateTime::<Utc>::UNIX_EPOCH + Duration::days(i as i64))
        .collect(),
      values,
    })
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn timestamps(&self) -> &[DateTime<Utc>] {
    &self.timestamps
  }

  /// Raw T×N return values.
  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn n_periods(&self) -> usize {
    self.values.nrows()
  }

  pub fn n_assets(&self) -> usize {
    self.values.ncols()
  }

  pub fn index_of(&self, symbol: &str) -> Option<usize> {
    self.symbols.iter().position(|s| s == symbol)
  }

  pub fn column(&self, symbol: &str) -> Option<ArrayView1<'_, f64>> {
    self.index_of(symbol).map(|j| self.values.column(j))
  }

  /// Per-asset mean periodic return.
  pub fn mean_returns(&self) -> Array1<f64> {
    self
      .values
      .mean_axis(Axis(0))
      .unwrap_or_else(|| Array1::zeros(self.n_assets()))
  }

  /// Sample (ddof = 1) covariance of periodic returns.
  pub fn covariance(&self) -> Result<Array2<f64>> {
    if self.n_periods() < MIN_RETURN_PERIODS {
      return Err(FolioError::insufficient(
        MIN_RETURN_PERIODS,
        self.n_periods(),
        "covariance",
      ));
    }
    self
      .values
      .t()
      .cov(1.0)
      .map_err(|_| FolioError::insufficient(MIN_RETURN_PERIODS, self.n_periods(), "covariance"))
  }

  /// Pearson correlation matrix; zero-variance assets correlate as `0.0` off the diagonal.
  pub fn correlation(&self) -> Array2<f64> {
    let n = self.n_assets();
    let mut corr = Array2::<f64>::eye(n);

    for i in 0..n {
      for j in (i + 1)..n {
        let r = pearson(self.values.column(i), self.values.column(j));
        corr[[i, j]] = r;
        corr[[j, i]] = r;
      }
    }

    corr
  }

  /// Sub-matrix with the requested symbols, in the requested order.
  pub fn select<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Self> {
    if symbols.is_empty() {
      return Err(FolioError::insufficient(1, 0, "selected assets"));
    }

    let idx = symbols
      .iter()
      .map(|s| {
        self
          .index_of(s.as_ref())
          .ok_or_else(|| FolioError::InvalidInput(format!("unknown symbol {}", s.as_ref())))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      symbols: idx.iter().map(|&j| self.symbols[j].clone()).collect(),
      timestamps: self.timestamps.clone(),
      values: self.values.select(Axis(1), &idx),
    })
  }

  /// Detach one column (typically the market index) from the matrix.
  pub fn split_off(&self, symbol: &str) -> Result<(Self, Array1<f64>)> {
    let j = self
      .index_of(symbol)
      .ok_or_else(|| FolioError::InvalidInput(format!("unknown symbol {symbol}")))?;
    let rest: Vec<&str> = self
      .symbols
      .iter()
      .filter(|s| s.as_str() != symbol)
      .map(String::as_str)
      .collect();
    let detached = self.values.column(j).to_owned();

    Ok((self.select(&rest)?, detached))
  }

  /// Periodic portfolio returns `R w`; symbols absent from `weights` carry zero weight.
  pub fn portfolio_returns(&self, weights: &WeightVector) -> Array1<f64> {
    let w = weights.aligned_to(&self.symbols);
    self.values.dot(&w)
  }
}
