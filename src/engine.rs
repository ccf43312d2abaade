//! # Portfolio Engine
//!
//! $$
//! P \;\to\; (\mu, \Sigma, \beta) \;\to\; \mathbf{w}^\* \;\to\; \text{risk}
//! $$
//!
//! Stateless facade over the optimizer, frontier, risk, simulation and rebalancing
//! modules, driven by one configuration value.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use ndarray::Array1;
use tracing::info;

use crate::beta::MIN_BETA_OBSERVATIONS;
use crate::data::fetch_prices;
use crate::data::provider::DEFAULT_MAX_AGE_SECS;
use crate::data::Holding;
use crate::data::PriceHistoryProvider;
use crate::data::PriceSeries;
use crate::data::ResultSink;
use crate::data::ReturnsMatrix;
use crate::data::WeightVector;
use crate::error::FolioError;
use crate::error::Result;
use crate::frontier::generate_frontier;
use crate::frontier::EfficientFrontierPoint;
use crate::optimizer::optimize;
use crate::optimizer::Objective;
use crate::optimizer::OptimizationResult;
use crate::optimizer::OptimizerConfig;
use crate::optimizer::SqpConfig;
use crate::rebalance::suggest_rebalancing;
use crate::rebalance::RebalanceAction;
use crate::rebalance::DEFAULT_REBALANCE_THRESHOLD;
use crate::risk::correlation_risk;
use crate::risk::portfolio_risk_metrics;
use crate::risk::risk_score;
use crate::risk::stress_test;
use crate::risk::tail::DEFAULT_CONFIDENCE_LEVELS;
use crate::risk::CorrelationRisk;
use crate::risk::RiskMetrics;
use crate::risk::RiskMetricsConfig;
use crate::risk::RiskScore;
use crate::risk::RiskScoreInputs;
use crate::risk::StressResult;
use crate::risk::StressScenario;
use crate::simulation::simulate;
use crate::simulation::MonteCarloConfig;
use crate::simulation::MonteCarloResult;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioEngineConfig {
  /// Annual risk-free rate used in Sharpe computations.
  pub risk_free_rate: f64,
  /// Annualization factor for returns and volatility.
  pub periods_per_year: f64,
  /// VaR/CVaR confidence levels.
  pub confidence_levels: Vec<f64>,
  /// VaR/CVaR horizon in periods.
  pub var_horizon: usize,
  /// Aligned observations required before a beta is reported.
  pub beta_min_observations: usize,
  pub solver: SqpConfig,
  /// Targets swept by [`PortfolioEngine::frontier`].
  pub frontier_points: usize,
  pub monte_carlo: MonteCarloConfig,
  /// Minimum trade size in currency units.
  pub rebalance_threshold: f64,
  /// Age beyond which fetched price history is reported as stale.
  pub max_price_age: Duration,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.06,
      periods_per_year: 252.0,
      confidence_levels: DEFAULT_CONFIDENCE_LEVELS.to_vec(),
      var_horizon: 1,
      beta_min_observations: MIN_BETA_OBSERVATIONS,
      solver: SqpConfig::default(),
      frontier_points: 100,
      monte_carlo: MonteCarloConfig::default(),
      rebalance_threshold: DEFAULT_REBALANCE_THRESHOLD,
      max_price_age: Duration::seconds(DEFAULT_MAX_AGE_SECS),
    }
  }
}

/// Returns with the market column detached.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedReturns {
  pub returns: ReturnsMatrix,
  pub market: Option<Array1<f64>>,
}

impl PreparedReturns {
  pub fn market(&self) -> Option<&[f64]> {
    self.market.as_ref().and_then(|m| m.as_slice())
  }
}

/// Single entry-point engine for optimization and risk workflows.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  pub fn optimizer_config(&self) -> OptimizerConfig {
    OptimizerConfig {
      risk_free_rate: self.config.risk_free_rate,
      periods_per_year: self.config.periods_per_year,
      beta_min_observations: self.config.beta_min_observations,
      solver: self.config.solver.clone(),
    }
  }

  pub fn risk_metrics_config(&self) -> RiskMetricsConfig {
    RiskMetricsConfig {
      confidence_levels: self.config.confidence_levels.clone(),
      horizon: self.config.var_horizon,
      min_observations: self.config.beta_min_observations,
      periods_per_year: self.config.periods_per_year,
    }
  }

  /// Align price series into returns, detaching `market_symbol` when given.
  pub fn prepare_returns(
    &self,
    prices: &[PriceSeries],
    market_symbol: Option<&str>,
  ) -> Result<PreparedReturns> {
    let all = ReturnsMatrix::from_prices(prices)?;
    match market_symbol {
      Some(symbol) => {
        let (returns, market) = all.split_off(symbol)?;
        Ok(PreparedReturns {
          returns,
          market: Some(market),
        })
      }
      None => Ok(PreparedReturns {
        returns: all,
        market: None,
      }),
    }
  }

  /// Pull `symbols` (and the market series) from `provider` and align them.
  pub fn load_returns<P: PriceHistoryProvider + ?Sized, S: AsRef<str>>(
    &self,
    provider: &P,
    symbols: &[S],
    market_symbol: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<PreparedReturns> {
    let mut wanted: Vec<&str> = symbols.iter().map(AsRef::as_ref).collect();
    if let Some(m) = market_symbol {
      if !wanted.contains(&m) {
        wanted.push(m);
      }
    }

    let prices = fetch_prices(provider, &wanted, now, self.config.max_price_age)?;
    self.prepare_returns(&prices, market_symbol)
  }

  /// Optimize weights for `objective`.
  pub fn optimize(
    &self,
    returns: &ReturnsMatrix,
    objective: Objective,
    market: Option<&[f64]>,
  ) -> OptimizationResult {
    optimize(returns, objective, market, &self.optimizer_config())
  }

  /// Optimize straight from price history; preprocessing errors become a failed result.
  pub fn optimize_prices(
    &self,
    prices: &[PriceSeries],
    objective: Objective,
    market_symbol: Option<&str>,
  ) -> OptimizationResult {
    match self.prepare_returns(prices, market_symbol) {
      Ok(prepared) => self.optimize(&prepared.returns, objective, prepared.market()),
      Err(e) => OptimizationResult::Failed {
        message: e.to_string(),
      },
    }
  }

  /// Efficient frontier over `frontier_points` targets.
  pub fn frontier(
    &self,
    returns: &ReturnsMatrix,
    market: Option<&[f64]>,
  ) -> Result<Vec<EfficientFrontierPoint>> {
    generate_frontier(
      returns,
      self.config.frontier_points,
      market,
      &self.optimizer_config(),
    )
  }

  pub fn risk_metrics(
    &self,
    returns: &ReturnsMatrix,
    weights: &WeightVector,
    market: Option<&[f64]>,
  ) -> Result<RiskMetrics> {
    portfolio_risk_metrics(returns, weights, market, &self.risk_metrics_config())
  }

  pub fn correlation_risk(
    &self,
    returns: &ReturnsMatrix,
    weights: &WeightVector,
  ) -> Option<CorrelationRisk> {
    correlation_risk(returns, weights)
  }

  pub fn stress_test(
    &self,
    weights: &WeightVector,
    scenarios: &[StressScenario],
    sectors: &BTreeMap<String, String>,
    base_value: f64,
  ) -> Result<Vec<StressResult>> {
    stress_test(weights, scenarios, sectors, base_value)
  }

  pub fn risk_score(&self, metrics: &RiskMetrics) -> RiskScore {
    risk_score(&RiskScoreInputs::from(metrics))
  }

  /// Monte Carlo projection with the configured simulation settings.
  pub fn simulate(&self, returns: &ReturnsMatrix, weights: &WeightVector) -> Result<MonteCarloResult> {
    simulate(returns, weights, &self.config.monte_carlo)
  }

  pub fn rebalance(
    &self,
    holdings: &[Holding],
    target: &WeightVector,
    total_value: f64,
  ) -> Result<Vec<RebalanceAction>> {
    suggest_rebalancing(holdings, target, total_value, self.config.rebalance_threshold)
  }

  /// Persist a successful optimization with its commentary.
  pub fn publish<K: ResultSink + ?Sized>(
    &self,
    sink: &K,
    session_id: &str,
    result: &OptimizationResult,
  ) -> Result<()> {
    let Some(portfolio) = result.optimized() else {
      return Err(FolioError::OptimizationFailure(result.message().to_string()));
    };

    sink.store(session_id, &portfolio.weights.to_map(), &result.commentary())?;
    info!(session_id, objective = %portfolio.objective, "stored optimized allocation");
    Ok(())
  }

  /// Persist every frontier point under `{session_id}/{target_return}`.
  pub fn publish_frontier<K: ResultSink + ?Sized>(
    &self,
    sink: &K,
    session_id: &str,
    points: &[EfficientFrontierPoint],
  ) -> Result<()> {
    for point in points {
      let key = format!("{session_id}/{:.4}", point.target_return);
      sink.store(&key, &point.weights.to_map(), &point.commentary())?;
    }
    info!(session_id, points = points.len(), "stored efficient frontier");
    Ok(())
  }

  /// Persist a simulation summary against the weights it was run for.
  pub fn publish_simulation<K: ResultSink + ?Sized>(
    &self,
    sink: &K,
    session_id: &str,
    weights: &WeightVector,
    result: &MonteCarloResult,
  ) -> Result<()> {
    sink.store(session_id, &weights.to_map(), &result.commentary())?;
    info!(session_id, "stored Monte Carlo summary");
    Ok(())
  }
}
