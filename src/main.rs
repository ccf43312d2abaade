//! `folio`: optimize and analyse a portfolio from a CSV of closing prices.
//!
//! ```bash
//! folio --prices closes.csv --market NIFTY optimize --objective max-sharpe
//! folio --prices closes.csv risk --objective min-volatility --sectors sectors.csv
//! folio --prices closes.csv frontier --points 50
//! folio --prices closes.csv simulate --simulations 5000 --horizon 252 --seed 7
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use clap::Parser;
use clap::Subcommand;
use csv::Trim;
use folio_rs::data::PriceSeries;
use folio_rs::data::WeightVector;
use folio_rs::engine::PreparedReturns;
use folio_rs::risk::default_scenarios;
use folio_rs::Objective;
use folio_rs::PortfolioEngine;
use folio_rs::PortfolioEngineConfig;
use prettytable::row;
use prettytable::Table;
use tracing::info;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Portfolio optimization and risk analytics", long_about = None)]
struct Cli {
  /// Wide CSV of closing prices: `date,SYM1,SYM2,...`
  #[arg(short, long)]
  prices: PathBuf,

  /// Column holding the market index; excluded from the investable universe
  #[arg(short, long)]
  market: Option<String>,

  /// Annual risk-free rate
  #[arg(long, default_value_t = 0.06)]
  risk_free: f64,

  /// Periods per year used for annualization
  #[arg(long, default_value_t = 252.0)]
  periods: f64,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Optimize weights for one objective
  Optimize {
    #[arg(short, long, default_value = "max-sharpe")]
    objective: Objective,
  },
  /// Risk report for optimized (or equal) weights
  Risk {
    /// Objective whose weights are analysed; equal weights when omitted
    #[arg(short, long)]
    objective: Option<Objective>,

    /// CSV of `symbol,sector` rows used by the stress scenarios
    #[arg(long)]
    sectors: Option<PathBuf>,

    /// Portfolio value for the stress test
    #[arg(long, default_value_t = 1_000_000.0)]
    base_value: f64,
  },
  /// Efficient frontier sweep
  Frontier {
    #[arg(long, default_value_t = 100)]
    points: usize,
  },
  /// Monte Carlo projection of terminal wealth
  Simulate {
    #[arg(short, long)]
    objective: Option<Objective>,

    #[arg(long, default_value_t = 1000)]
    simulations: usize,

    #[arg(long, default_value_t = 252)]
    horizon: usize,

    #[arg(long)]
    seed: Option<u64>,
  },
}

fn init_logging() {
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with(fmt::layer().with_writer(std::io::stderr))
    .init();
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
  if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
    return Ok(ts.with_timezone(&Utc));
  }
  let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("unparseable date {raw:?}"))?;
  date
    .and_hms_opt(0, 0, 0)
    .map(|d| d.and_utc())
    .ok_or_else(|| anyhow!("invalid date {raw:?}"))
}

/// One series per column; empty cells are skipped and later dropped by the inner join.
fn read_prices(path: &Path) -> anyhow::Result<Vec<PriceSeries>> {
  let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
  parse_prices(file).with_context(|| format!("reading {}", path.display()))
}

fn parse_prices<R: Read>(reader: R) -> anyhow::Result<Vec<PriceSeries>> {
  let mut csv_reader = csv::ReaderBuilder::new()
    .trim(Trim::All)
    .from_reader(reader);

  let symbols: Vec<String> = csv_reader
    .headers()?
    .iter()
    .skip(1)
    .map(str::to_string)
    .collect();
  if symbols.is_empty() {
    bail!("no price columns");
  }

  let mut columns: Vec<Vec<(DateTime<Utc>, f64)>> = vec![Vec::new(); symbols.len()];
  for record in csv_reader.records() {
    let record = record?;
    let line = record.position().map_or(0, |p| p.line());
    let raw_date = match record.get(0) {
      Some(d) if !d.is_empty() => d,
      _ => bail!("line {line}: missing date"),
    };
    let stamp = parse_timestamp(raw_date).with_context(|| format!("line {line}"))?;

    for (column, field) in columns.iter_mut().zip(record.iter().skip(1)) {
      if field.is_empty() {
        continue;
      }
      let close: f64 = field
        .parse()
        .with_context(|| format!("line {line}: bad price {field:?}"))?;
      column.push((stamp, close));
    }
  }

  let fetched_at = Utc::now();
  Ok(
    symbols
      .iter()
      .zip(columns.iter())
      .map(|(s, c)| PriceSeries::from_closes(s.as_str(), c, fetched_at))
      .collect(),
  )
}

fn read_sectors(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
  let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
  parse_sectors(file).with_context(|| format!("reading {}", path.display()))
}

/// `symbol,sector` rows, with an optional `symbol,sector` header.
fn parse_sectors<R: Read>(reader: R) -> anyhow::Result<BTreeMap<String, String>> {
  let mut csv_reader = csv::ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .trim(Trim::All)
    .from_reader(reader);

  let mut sectors = BTreeMap::new();
  for record in csv_reader.records() {
    let record = record?;
    let (Some(symbol), Some(sector)) = (record.get(0), record.get(1)) else {
      continue;
    };
    if symbol.is_empty() || symbol.eq_ignore_ascii_case("symbol") {
      continue;
    }
    sectors.insert(symbol.to_string(), sector.to_uppercase());
  }
  Ok(sectors)
}

fn pct(x: Option<f64>) -> String {
  x.map(|v| format!("{:.2}%", v * 100.0))
    .unwrap_or_else(|| "N/A".to_string())
}

fn num(x: Option<f64>) -> String {
  x.map(|v| format!("{v:.4}"))
    .unwrap_or_else(|| "N/A".to_string())
}

fn weights_for(
  engine: &PortfolioEngine,
  prepared: &PreparedReturns,
  objective: Option<Objective>,
) -> anyhow::Result<WeightVector> {
  match objective {
    None => Ok(WeightVector::equal(prepared.returns.symbols())),
    Some(o) => {
      let result = engine.optimize(&prepared.returns, o, prepared.market());
      match result.weights() {
        Some(w) => Ok(w.clone()),
        None => bail!("{o}: {}", result.message()),
      }
    }
  }
}

fn print_weights(weights: &WeightVector) {
  let mut table = Table::new();
  table.add_row(row!["Symbol", "Weight"]);
  for (symbol, w) in weights.iter() {
    table.add_row(row![symbol, format!("{:.2}%", w * 100.0)]);
  }
  table.printstd();
}

fn main() -> anyhow::Result<()> {
  init_logging();
  let cli = Cli::parse();

  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    risk_free_rate: cli.risk_free,
    periods_per_year: cli.periods,
    ..Default::default()
  });

  let prices = read_prices(&cli.prices)?;
  let prepared = engine.prepare_returns(&prices, cli.market.as_deref())?;
  info!(
    assets = prepared.returns.n_assets(),
    periods = prepared.returns.n_periods(),
    "loaded returns"
  );

  match cli.command {
    Command::Optimize { objective } => {
      let result = engine.optimize(&prepared.returns, objective, prepared.market());
      let Some(portfolio) = result.optimized() else {
        bail!("{objective}: {}", result.message());
      };

      print_weights(&portfolio.weights);
      let m = &portfolio.metrics;
      let mut table = Table::new();
      table.add_row(row!["Objective", objective]);
      table.add_row(row!["Annual return", pct(Some(m.annual_return))]);
      table.add_row(row!["Annual volatility", pct(Some(m.annual_volatility))]);
      table.add_row(row!["Sharpe", num(Some(m.sharpe))]);
      let beta = if m.beta_approximate {
        format!("{} (approx.)", num(m.beta))
      } else {
        num(m.beta)
      };
      table.add_row(row!["Beta", beta]);
      table.add_row(row!["Iterations", portfolio.iterations]);
      table.printstd();
      println!("{}", result.commentary());
    }

    Command::Risk {
      objective,
      sectors,
      base_value,
    } => {
      let weights = weights_for(&engine, &prepared, objective)?;
      print_weights(&weights);

      let metrics = engine.risk_metrics(&prepared.returns, &weights, prepared.market())?;
      let mut table = Table::new();
      table.add_row(row!["Metric", "Value"]);
      table.add_row(row!["Observations", metrics.observations]);
      table.add_row(row!["Annual volatility", pct(metrics.volatility)]);
      table.add_row(row!["Skewness", num(metrics.skewness)]);
      table.add_row(row!["Excess kurtosis", num(metrics.kurtosis)]);
      for t in &metrics.tail {
        let level = t.confidence * 100.0;
        table.add_row(row![format!("VaR {level:.0}%"), pct(t.var)]);
        table.add_row(row![format!("CVaR {level:.0}%"), pct(t.cvar)]);
      }
      table.add_row(row!["Max drawdown", pct(metrics.max_drawdown())]);
      table.add_row(row!["Beta", num(metrics.beta)]);
      table.add_row(row!["Tracking error", pct(metrics.tracking_error)]);

      if let Some(corr) = engine.correlation_risk(&prepared.returns, &weights) {
        table.add_row(row![
          "Average correlation",
          format!("{:.4} ({})", corr.average_correlation, corr.correlation_level)
        ]);
        table.add_row(row![
          "HHI",
          format!("{:.4} ({})", corr.concentration.hhi, corr.concentration.level)
        ]);
        table.add_row(row!["Diversification ratio", num(corr.concentration.diversification_ratio)]);
      }

      let score = engine.risk_score(&metrics);
      table.add_row(row!["Risk score", format!("{:.1} / 100", score.total)]);
      table.printstd();

      let sectors = match sectors {
        Some(path) => read_sectors(&path)?,
        None => BTreeMap::new(),
      };
      let stress = engine.stress_test(&weights, &default_scenarios(), &sectors, base_value)?;
      let mut table = Table::new();
      table.add_row(row!["Scenario", "Impact", "Change", "New value"]);
      for s in stress {
        table.add_row(row![
          s.scenario,
          pct(Some(s.portfolio_impact)),
          format!("{:.2}", s.absolute_impact),
          format!("{:.2}", s.new_value)
        ]);
      }
      table.printstd();
    }

    Command::Frontier { points } => {
      let engine = PortfolioEngine::new(PortfolioEngineConfig {
        frontier_points: points,
        ..engine.config().clone()
      });
      let frontier = engine.frontier(&prepared.returns, prepared.market())?;

      let mut table = Table::new();
      table.add_row(row!["Target return", "Volatility", "Sharpe", "Beta"]);
      for p in &frontier {
        table.add_row(row![
          pct(Some(p.target_return)),
          pct(Some(p.volatility)),
          num(Some(p.sharpe)),
          num(p.beta)
        ]);
      }
      table.printstd();
      println!("{} of {} points solved", frontier.len(), points);
    }

    Command::Simulate {
      objective,
      simulations,
      horizon,
      seed,
    } => {
      let weights = weights_for(&engine, &prepared, objective)?;
      let mut config = engine.config().clone();
      config.monte_carlo.num_simulations = simulations;
      config.monte_carlo.horizon = horizon;
      config.monte_carlo.seed = seed;
      let engine = PortfolioEngine::new(config);

      let result = engine.simulate(&prepared.returns, &weights)?;
      let mut table = Table::new();
      table.add_row(row!["Statistic", "Terminal wealth"]);
      for (p, v) in result.percentiles.as_array() {
        table.add_row(row![format!("P{p}"), format!("{v:.4}")]);
      }
      table.add_row(row!["Mean", format!("{:.4}", result.mean)]);
      table.add_row(row!["Std", format!("{:.4}", result.std)]);
      table.add_row(row!["P(loss)", pct(Some(result.probability_of_loss))]);
      table.printstd();
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quoted_symbols_keep_their_columns() {
    let raw = "date,\"BRK,B\",TCS\n2024-01-01,400,3500\n2024-01-02,404,3535\n";
    let series = parse_prices(raw.as_bytes()).unwrap();

    let symbols: Vec<&str> = series.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BRK,B", "TCS"]);
    assert_eq!(series[1].closes(), vec![3500.0, 3535.0]);
  }

  #[test]
  fn empty_cells_are_skipped() {
    let raw = "date,A,B\n2024-01-01,10,\n2024-01-02,11,20\n";
    let series = parse_prices(raw.as_bytes()).unwrap();
    assert_eq!(series[0].len(), 2);
    assert_eq!(series[1].len(), 1);
  }

  #[test]
  fn ragged_rows_and_missing_dates_are_errors() {
    let ragged = "date,A,B\n2024-01-01,10\n";
    assert!(parse_prices(ragged.as_bytes()).is_err());

    let undated = "date,A\n,10\n";
    let err = parse_prices(undated.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("missing date"), "{err}");
  }

  #[test]
  fn sectors_accept_quotes_and_a_header() {
    let raw = "symbol,sector\nHDFC,\"Banking, Private\"\ninfy,technology\n";
    let sectors = parse_sectors(raw.as_bytes()).unwrap();
    assert_eq!(sectors.len(), 2);
    assert_eq!(sectors["HDFC"], "BANKING, PRIVATE");
    assert_eq!(sectors["infy"], "TECHNOLOGY");
  }
}
