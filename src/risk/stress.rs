//! # Stress Testing
//!
//! $$
//! \Delta_p = \sum_i w_i\, s_i,\qquad V' = V(1+\Delta_p)
//! $$
//!
//! Scenario shocks resolve per holding by priority: explicit symbol, then the
//! holding's sector bucket, then the market-wide shock, else zero.

use std::collections::BTreeMap;

use crate::data::WeightVector;
use crate::error::FolioError;
use crate::error::Result;

/// A named set of fractional price shocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StressScenario {
  pub name: String,
  pub symbol_shocks: BTreeMap<String, f64>,
  pub sector_shocks: BTreeMap<String, f64>,
  /// Shock applied to every holding without a more specific entry.
  pub market_shock: Option<f64>,
}

impl StressScenario {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn with_symbol(mut self, symbol: impl Into<String>, shock: f64) -> Self {
    self.symbol_shocks.insert(symbol.into(), shock);
    self
  }

  pub fn with_sector(mut self, sector: impl Into<String>, shock: f64) -> Self {
    self.sector_shocks.insert(sector.into(), shock);
    self
  }

  pub fn with_market(mut self, shock: f64) -> Self {
    self.market_shock = Some(shock);
    self
  }

  /// Shock for one holding.
  pub fn shock_for(&self, symbol: &str, sector: Option<&str>) -> f64 {
    self
      .symbol_shocks
      .get(symbol)
      .or_else(|| sector.and_then(|s| self.sector_shocks.get(s)))
      .copied()
      .or(self.market_shock)
      .unwrap_or(0.0)
  }

  fn validate(&self) -> Result<()> {
    let all_finite = self
      .symbol_shocks
      .values()
      .chain(self.sector_shocks.values())
      .chain(self.market_shock.iter())
      .all(|s| s.is_finite());

    if all_finite {
      Ok(())
    } else {
      Err(FolioError::InvalidInput(format!(
        "scenario {} has a non-finite shock",
        self.name
      )))
    }
  }
}

/// Outcome of one scenario.
#[derive(Clone, Debug, PartialEq)]
pub struct StressResult {
  pub scenario: String,
  /// Fractional change in portfolio value.
  pub portfolio_impact: f64,
  /// Change in currency units against the base value.
  pub absolute_impact: f64,
  pub new_value: f64,
}

/// Evaluate every scenario independently against the same weights and base value.
pub fn stress_test(
  weights: &WeightVector,
  scenarios: &[StressScenario],
  sectors: &BTreeMap<String, String>,
  base_value: f64,
) -> Result<Vec<StressResult>> {
  if !base_value.is_finite() {
    return Err(FolioError::InvalidInput(
      "base value must be finite".to_string(),
    ));
  }

  scenarios
    .iter()
    .map(|scenario| {
      scenario.validate()?;

      let portfolio_impact: f64 = weights
        .iter()
        .map(|(symbol, w)| w * scenario.shock_for(symbol, sectors.get(symbol).map(String::as_str)))
        .sum();

      Ok(StressResult {
        scenario: scenario.name.clone(),
        portfolio_impact,
        absolute_impact: portfolio_impact * base_value,
        new_value: base_value * (1.0 + portfolio_impact),
      })
    })
    .collect()
}

/// Stock scenario set: broad crash, sector selloffs, currency and consumer shocks.
pub fn default_scenarios() -> Vec<StressScenario> {
  vec![
    StressScenario::new("Market Crash (-25%)").with_market(-0.25),
    StressScenario::new("Technology Selloff (-30%)").with_sector("TECHNOLOGY", -0.30),
    StressScenario::new("Banking Crisis (-20%)").with_sector("FINANCIALS", -0.20),
    StressScenario::new("Currency Depreciation (-10%)").with_market(-0.10),
    StressScenario::new("Consumer Slowdown")
      .with_sector("CONSUMER_STAPLES", -0.20)
      .with_sector("AUTOMOBILE", -0.15),
  ]
}
