//! # Collaborators
//!
//! Contracts for the price-history provider that feeds the engine and the sink that
//! persists its results, with in-memory implementations.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use tracing::warn;

use super::price::PriceSeries;
use crate::error::FolioError;
use crate::error::Result;

/// Default freshness window for cached price history.
pub const DEFAULT_MAX_AGE_SECS: i64 = 3600;

/// Source of historical prices.
pub trait PriceHistoryProvider {
  fn get_series(&self, symbol: &str) -> Result<PriceSeries>;
}

/// Destination for computed allocations and their commentary.
pub trait ResultSink {
  fn store(
    &self,
    session_id: &str,
    allocation: &BTreeMap<String, f64>,
    commentary: &str,
  ) -> Result<()>;
}

/// Fetch every symbol from `provider`, warning about series older than `max_age`.
pub fn fetch_prices<P: PriceHistoryProvider + ?Sized, S: AsRef<str>>(
  provider: &P,
  symbols: &[S],
  now: DateTime<Utc>,
  max_age: Duration,
) -> Result<Vec<PriceSeries>> {
  symbols
    .iter()
    .map(|s| {
      let series = provider.get_series(s.as_ref())?;
      if series.is_stale(now, max_age) {
        warn!(
          symbol = s.as_ref(),
          fetched_at = %series.fetched_at,
          "price series is stale"
        );
      }
      Ok(series)
    })
    .collect()
}

/// Provider backed by a fixed set of series.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPriceProvider {
  series: HashMap<String, PriceSeries>,
}

impl InMemoryPriceProvider {
  pub fn new(series: Vec<PriceSeries>) -> Self {
    Self {
      series: series.into_iter().map(|s| (s.symbol.clone(), s)).collect(),
    }
  }

  pub fn insert(&mut self, series: PriceSeries) {
    self.series.insert(series.symbol.clone(), series);
  }

  pub fn symbols(&self) -> Vec<String> {
    let mut out: Vec<String> = self.series.keys().cloned().collect();
    out.sort();
    out
  }
}

impl PriceHistoryProvider for InMemoryPriceProvider {
  fn get_series(&self, symbol: &str) -> Result<PriceSeries> {
    self
      .series
      .get(symbol)
      .cloned()
      .ok_or_else(|| FolioError::Provider(format!("no price history for {symbol}")))
  }
}

/// One persisted result.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredResult {
  pub session_id: String,
  pub allocation: BTreeMap<String, f64>,
  pub commentary: String,
}

/// Sink that keeps results in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
  records: Mutex<Vec<StoredResult>>,
}

impl MemorySink {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stored results in insertion order. A poisoned lock still yields what was stored.
  pub fn records(&self) -> Vec<StoredResult> {
    self
      .records
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}

impl ResultSink for MemorySink {
  fn store(
    &self,
    session_id: &str,
    allocation: &BTreeMap<String, f64>,
    commentary: &str,
  ) -> Result<()> {
    let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
    records.push(StoredResult {
      session_id: session_id.to_string(),
      allocation: allocation.clone(),
      commentary: commentary.to_string(),
    });
    Ok(())
  }
}
