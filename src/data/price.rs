//! # Price History
//!
//! OHLCV bars as delivered by a price-history provider.

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use impl_new_derive::ImplNew;

/// A single OHLCV bar.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct PriceBar {
  pub timestamp: DateTime<Utc>,
  pub open: f64,
  pub high: f64,
  pub low: f64,
  pub close: f64,
  pub volume: f64,
}

/// Ordered price history of one instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSeries {
  /// Instrument symbol.
  pub symbol: String,
  /// Bars in ascending timestamp order.
  pub bars: Vec<PriceBar>,
  /// When the provider produced this series.
  pub fetched_at: DateTime<Utc>,
}

impl PriceSeries {
  /// Build a series, sorting the bars by timestamp.
  pub fn new(symbol: impl Into<String>, mut bars: Vec<PriceBar>, fetched_at: DateTime<Utc>) -> Self {
    bars.sort_by_key(|b| b.timestamp);
    Self {
      symbol: symbol.into(),
      bars,
      fetched_at,
    }
  }

  /// Close-only series, convenient when only settlement prices are known.
  pub fn from_closes(
    symbol: impl Into<String>,
    points: &[(DateTime<Utc>, f64)],
    fetched_at: DateTime<Utc>,
  ) -> Self {
    let bars = points
      .iter()
      .map(|&(ts, close)| PriceBar::new(ts, close, close, close, close, 0.0))
      .collect();
    Self::new(symbol, bars, fetched_at)
  }

  pub fn len(&self) -> usize {
    self.bars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bars.is_empty()
  }

  /// Closing prices in timestamp order.
  pub fn closes(&self) -> Vec<f64> {
    self.bars.iter().map(|b| b.close).collect()
  }

  /// Whether the series is older than `max_age` at `now`.
  pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
    now.signed_duration_since(self.fetched_at) > max_age
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn bars_are_sorted_on_construction() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
    let series = PriceSeries::from_closes("AAA", &[(t1, 101.0), (t0, 100.0)], t1);

    assert_eq!(series.closes(), vec![100.0, 101.0]);
    assert_eq!(series.bars[0].timestamp, t0);
  }

  #[test]
  fn staleness_uses_fetch_time() {
    let fetched = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
    let series = PriceSeries::from_closes("AAA", &[(fetched, 1.0)], fetched);

    assert!(!series.is_stale(fetched + Duration::minutes(30), Duration::hours(1)));
    assert!(series.is_stale(fetched + Duration::minutes(61), Duration::hours(1)));
  }
}
