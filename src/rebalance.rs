//! # Rebalancing
//!
//! $$
//! \Delta_i = w_i^{target} - w_i^{current},\qquad a_i = |\Delta_i|\,V
//! $$
//!
//! Trades below the currency threshold are dropped.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use ordered_float::OrderedFloat;
use tracing::warn;

use crate::data::Holding;
use crate::data::WeightVector;
use crate::error::FolioError;
use crate::error::Result;

/// Default minimum trade size in currency units.
pub const DEFAULT_REBALANCE_THRESHOLD: f64 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
  Buy,
  Sell,
}

impl fmt::Display for Side {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Side::Buy => f.write_str("BUY"),
      Side::Sell => f.write_str("SELL"),
    }
  }
}

/// One suggested trade.
#[derive(Clone, Debug, PartialEq)]
pub struct RebalanceAction {
  pub symbol: String,
  pub side: Side,
  /// Trade size in currency units, always positive.
  pub amount: f64,
  pub current_weight: f64,
  pub target_weight: f64,
  /// `target_weight - current_weight`.
  pub weight_difference: f64,
}

fn market_values(holdings: &[Holding]) -> Result<BTreeMap<String, f64>> {
  let mut values = BTreeMap::new();
  for h in holdings {
    if !h.market_value.is_finite() {
      return Err(FolioError::InvalidInput(format!(
        "non-finite market value for {}",
        h.symbol
      )));
    }
    *values.entry(h.symbol.clone()).or_insert(0.0) += h.market_value;
  }
  if let Some((symbol, value)) = values.iter().find(|(_, v)| **v < 0.0) {
    return Err(FolioError::InvalidInput(format!(
      "short position {symbol} worth {value} in a long-only book"
    )));
  }
  Ok(values)
}

/// Weights implied by market values. Repeated symbols are summed.
pub fn current_allocation(holdings: &[Holding]) -> Result<WeightVector> {
  let values = market_values(holdings)?;
  let total: f64 = values.values().sum();
  if total == 0.0 {
    return Err(FolioError::DegenerateInput(
      "total portfolio value is zero".to_string(),
    ));
  }

  let symbols: Vec<&str> = values.keys().map(String::as_str).collect();
  let weights = values.values().map(|v| v / total).collect();
  WeightVector::new(&symbols, weights)
}

/// Trades moving `holdings` to `target` for a portfolio worth `total_value`, largest first.
///
/// Covers every symbol in either the holdings or the target. A zero-value book is
/// treated as all cash.
pub fn suggest_rebalancing(
  holdings: &[Holding],
  target: &WeightVector,
  total_value: f64,
  threshold: f64,
) -> Result<Vec<RebalanceAction>> {
  if !total_value.is_finite() || !threshold.is_finite() {
    return Err(FolioError::InvalidInput(
      "total value and threshold must be finite".to_string(),
    ));
  }

  let current = match current_allocation(holdings) {
    Ok(w) => w.to_map(),
    Err(FolioError::DegenerateInput(msg)) => {
      warn!(%msg, "rebalancing from an empty book");
      BTreeMap::new()
    }
    Err(e) => return Err(e),
  };
  let target_map = target.to_map();

  let universe: BTreeSet<&String> = current.keys().chain(target_map.keys()).collect();
  let mut actions: Vec<RebalanceAction> = universe
    .into_iter()
    .filter_map(|symbol| {
      let current_weight = current.get(symbol).copied().unwrap_or(0.0);
      let target_weight = target_map.get(symbol).copied().unwrap_or(0.0);
      let weight_difference = target_weight - current_weight;
      let amount = weight_difference * total_value;

      (amount.abs() > threshold).then(|| RebalanceAction {
        symbol: symbol.clone(),
        side: if weight_difference > 0.0 { Side::Buy } else { Side::Sell },
        amount: amount.abs(),
        current_weight,
        target_weight,
        weight_difference,
      })
    })
    .collect();

  actions.sort_by(|a, b| {
    OrderedFloat(b.amount)
      .cmp(&OrderedFloat(a.amount))
      .then_with(|| a.symbol.cmp(&b.symbol))
  });
  Ok(actions)
}
