use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use folio_rs::data::Holding;
use folio_rs::data::ReturnsMatrix;
use folio_rs::data::WeightVector;
use folio_rs::optimizer::PortfolioModel;
use folio_rs::optimizer::SqpConfig;
use folio_rs::rebalance::Side;
use folio_rs::risk::concentration;
use folio_rs::risk::conditional_value_at_risk;
use folio_rs::risk::value_at_risk;
use folio_rs::risk::StressScenario;
use folio_rs::simulation::MonteCarloConfig;
use folio_rs::Objective;
use folio_rs::PortfolioEngine;
use folio_rs::PortfolioEngineConfig;
use ndarray::array;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;

fn synthetic(seed: u64, periods: usize) -> (ReturnsMatrix, Vec<f64>) {
  let mut rng = StdRng::seed_from_u64(seed);
  let market_dist = Normal::new(0.0004, 0.01).unwrap();
  let market: Vec<f64> = (0..periods).map(|_| market_dist.sample(&mut rng)).collect();

  let specs = [
    ("TECH", 1.3, 0.0004, 0.012),
    ("BANK", 1.0, 0.0002, 0.008),
    ("UTIL", 0.4, 0.0001, 0.004),
    ("AUTO", 0.9, 0.0003, 0.010),
  ];
  let columns: Vec<Vec<f64>> = specs
    .iter()
    .map(|&(_, beta, alpha, idio)| {
      let noise = Normal::new(0.0, idio).unwrap();
      market
        .iter()
        .map(|m| alpha + beta * m + noise.sample(&mut rng))
        .collect()
    })
    .collect();
  let symbols: Vec<&str> = specs.iter().map(|s| s.0).collect();

  (ReturnsMatrix::from_columns(&symbols, &columns).unwrap(), market)
}

#[test]
fn optimized_weights_form_a_long_only_budget() {
  let engine = PortfolioEngine::default();
  let (returns, market) = synthetic(17, 260);

  for objective in Objective::ALL {
    let result = engine.optimize(&returns, objective, Some(&market));
    let weights = result
      .weights()
      .unwrap_or_else(|| panic!("{objective} failed: {}", result.message()));
    assert!((weights.sum() - 1.0).abs() < 1e-4, "{objective}");
    for (_, w) in weights.iter() {
      assert!((0.0..=1.0).contains(&w), "{objective}: {w}");
    }
  }
}

#[test]
fn min_beta_prefers_the_defensive_asset() {
  let engine = PortfolioEngine::default();
  let (returns, market) = synthetic(5, 260);

  let result = engine.optimize(&returns, Objective::MinBeta, Some(&market));
  let weights = result.weights().unwrap();
  assert!(weights.get("UTIL").unwrap() > 0.99);
  assert!(!result.metrics().unwrap().beta_approximate);
}

#[test]
fn single_asset_is_fully_invested_for_every_objective() {
  let engine = PortfolioEngine::default();
  let returns = ReturnsMatrix::from_columns(&["SOLO"], &[vec![0.01, -0.005, 0.002, 0.007]]).unwrap();

  for objective in Objective::ALL {
    let result = engine.optimize(&returns, objective, None);
    assert_eq!(result.weights().unwrap().get("SOLO"), Some(1.0), "{objective}");
  }
}

#[test]
fn max_sharpe_splits_identical_uncorrelated_assets() {
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    risk_free_rate: 0.0,
    ..Default::default()
  });
  // equal means and variances, zero sample covariance
  let a: Vec<f64> = [0.01, -0.01, 0.01, -0.01].iter().map(|x| x + 0.001).collect();
  let b: Vec<f64> = [0.01, 0.01, -0.01, -0.01].iter().map(|x| x + 0.001).collect();
  let returns = ReturnsMatrix::from_columns(&["A", "B"], &[a, b]).unwrap();

  let result = engine.optimize(&returns, Objective::MaxSharpe, None);
  let weights = result.weights().unwrap();
  assert_abs_diff_eq!(weights.get("A").unwrap(), 0.5, epsilon = 1e-4);
  assert_abs_diff_eq!(weights.get("B").unwrap(), 0.5, epsilon = 1e-4);
}

#[test]
fn equal_weight_volatility_matches_closed_form() {
  let model = PortfolioModel::from_moments(
    &["A", "B", "C"],
    array![0.01, 0.02, -0.01],
    Array2::from_diag(&array![0.0004, 0.0009, 0.0001]),
    vec![None; 3],
    0.06,
    252.0,
  )
  .unwrap();

  let metrics = model.metrics(&[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]);
  let expected = ((0.0004 + 0.0009 + 0.0001) / 9.0 * 252.0_f64).sqrt();
  assert_abs_diff_eq!(metrics.annual_volatility, expected, epsilon = 1e-6);
}

#[test]
fn short_history_fails_without_panicking() {
  let engine = PortfolioEngine::default();
  let returns = ReturnsMatrix::from_columns(&["A", "B"], &[vec![0.01], vec![0.02]]).unwrap();

  let result = engine.optimize(&returns, Objective::MinVolatility, None);
  assert!(!result.is_success());
  assert!(result.commentary().starts_with("Optimization failed"));
}

#[test]
fn deeper_confidence_never_shrinks_var() {
  let engine = PortfolioEngine::default();
  let (returns, market) = synthetic(9, 500);
  let weights = WeightVector::equal(returns.symbols());

  let metrics = engine.risk_metrics(&returns, &weights, Some(&market)).unwrap();
  let var95 = metrics.var(0.95).unwrap();
  let var99 = metrics.var(0.99).unwrap();
  assert!(var99.abs() >= var95.abs());
  assert!(metrics.beta.is_some());
  assert!(metrics.tracking_error.is_some());
}

#[test]
fn single_worst_return_sets_var_and_leaves_cvar_unavailable() {
  let returns = [0.05, -0.03, 0.02, -0.08, 0.01];
  assert_eq!(value_at_risk(&returns, 0.95, 1), Some(-0.08));
  assert_eq!(conditional_value_at_risk(&returns, 0.95, 1), None);
}

#[test]
fn herfindahl_bounds() {
  let single = WeightVector::from_pairs(&[("ONE", 1.0)]).unwrap();
  let c = concentration(&single);
  assert_eq!(c.hhi, 1.0);
  assert_eq!(c.diversification_ratio, Some(1.0));

  let five = WeightVector::equal(&["A", "B", "C", "D", "E"]);
  assert_abs_diff_eq!(concentration(&five).hhi, 0.2, epsilon = 1e-15);
}

#[test]
fn zero_shock_scenario_preserves_value() {
  let engine = PortfolioEngine::default();
  let weights = WeightVector::from_pairs(&[("TECH", 0.7), ("BANK", 0.3)]).unwrap();
  let sectors: BTreeMap<String, String> = [("TECH".to_string(), "TECHNOLOGY".to_string())]
    .into_iter()
    .collect();
  let flat = StressScenario::new("flat")
    .with_sector("TECHNOLOGY", 0.0)
    .with_market(0.0);

  let results = engine.stress_test(&weights, &[flat], &sectors, 250_000.0).unwrap();
  assert_eq!(results[0].new_value, 250_000.0);
}

#[test]
fn frontier_volatility_rises_beyond_minimum_variance() {
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    frontier_points: 20,
    ..Default::default()
  });
  let (returns, _) = synthetic(31, 260);

  let gmv = engine.optimize(&returns, Objective::MinVolatility, None);
  let gmv_return = gmv.metrics().unwrap().annual_return;
  let frontier = engine.frontier(&returns, None).unwrap();
  assert!(!frontier.is_empty());

  let upper: Vec<f64> = frontier
    .iter()
    .filter(|p| p.target_return >= gmv_return)
    .map(|p| p.volatility)
    .collect();
  for pair in upper.windows(2) {
    assert!(pair[1] >= pair[0] - 1e-5, "{} -> {}", pair[0], pair[1]);
  }
}

#[test]
fn seeded_simulation_is_reproducible() {
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    monte_carlo: MonteCarloConfig {
      num_simulations: 300,
      horizon: 60,
      seed: Some(2024),
      keep_paths: false,
    },
    ..Default::default()
  });
  let (returns, _) = synthetic(3, 120);
  let weights = WeightVector::equal(returns.symbols());

  let first = engine.simulate(&returns, &weights).unwrap();
  let second = engine.simulate(&returns, &weights).unwrap();
  assert_eq!(first.percentiles, second.percentiles);
  assert!(first.paths.is_none());
  assert!(first.percentiles.p5 <= first.percentiles.p95);
}

#[test]
fn rebalancing_targets_optimized_weights() {
  let engine = PortfolioEngine::default();
  let holdings = vec![
    Holding::new("TECH".to_string(), 80_000.0),
    Holding::new("BANK".to_string(), 20_000.0),
  ];
  let target = WeightVector::from_pairs(&[("TECH", 0.25), ("BANK", 0.25), ("UTIL", 0.5)]).unwrap();

  let actions = engine.rebalance(&holdings, &target, 100_000.0).unwrap();
  assert_eq!(actions.len(), 3);
  assert_eq!(actions[0].symbol, "TECH");
  assert_eq!(actions[0].side, Side::Sell);
  assert_abs_diff_eq!(actions[0].amount, 55_000.0, epsilon = 1e-9);
}

#[test]
fn solver_settings_flow_through_the_engine() {
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    solver: SqpConfig {
      max_iter: 1,
      ..Default::default()
    },
    ..Default::default()
  });
  let (returns, _) = synthetic(8, 200);

  let result = engine.optimize(&returns, Objective::MaxReturn, None);
  if let Some(p) = result.optimized() {
    assert!(p.iterations <= 1);
  } else {
    assert_eq!(result.message(), "Iteration limit reached");
  }
}

#[test]
fn duplicated_asset_with_singular_covariance_still_solves() {
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    frontier_points: 20,
    ..Default::default()
  });
  let mut rng = StdRng::seed_from_u64(44);
  let a_dist = Normal::new(0.0006, 0.012).unwrap();
  let c_dist = Normal::new(0.0002, 0.006).unwrap();
  let a: Vec<f64> = (0..250).map(|_| a_dist.sample(&mut rng)).collect();
  let c: Vec<f64> = (0..250).map(|_| c_dist.sample(&mut rng)).collect();
  let returns = ReturnsMatrix::from_columns(&["A", "A2", "C"], &[a.clone(), a, c]).unwrap();

  for objective in Objective::ALL {
    let result = engine.optimize(&returns, objective, None);
    let weights = result
      .weights()
      .unwrap_or_else(|| panic!("{objective} failed: {}", result.message()));
    assert!(weights.is_long_only_budget(1e-4), "{objective}");
  }

  let frontier = engine.frontier(&returns, None).unwrap();
  assert!(!frontier.is_empty());
  for point in &frontier {
    assert!(point.weights.is_long_only_budget(1e-4));
    assert!(point.volatility.is_finite());
  }
}
