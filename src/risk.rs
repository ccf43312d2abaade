//! # Risk Analytics
//!
//! $$
//! \mathrm{VaR},\ \mathrm{CVaR},\ \mathrm{MDD},\ \bar\rho,\ \mathrm{HHI},\ S\in[0,100]
//! $$
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`tail`] | Historical VaR and CVaR with square-root-of-time scaling. |
//! | [`drawdown`] | Maximum drawdown with peak and trough indices. |
//! | [`concentration`] | Pairwise correlation and Herfindahl concentration. |
//! | [`stress`] | Named scenario shocks against current weights. |
//! | [`score`] | Composite 0-100 risk score. |
//! | [`metrics`] | Bundled portfolio risk profile. |

pub mod concentration;
pub mod drawdown;
pub mod metrics;
pub mod score;
pub mod stress;
pub mod tail;

pub use concentration::concentration;
pub use concentration::correlation_risk;
pub use concentration::Concentration;
pub use concentration::CorrelationRisk;
pub use concentration::RiskLevel;
pub use drawdown::max_drawdown;
pub use drawdown::Drawdown;
pub use metrics::portfolio_risk_metrics;
pub use metrics::series_risk_metrics;
pub use metrics::RiskMetrics;
pub use metrics::RiskMetricsConfig;
pub use score::risk_score;
pub use score::RiskScore;
pub use score::RiskScoreInputs;
pub use stress::default_scenarios;
pub use stress::stress_test;
pub use stress::StressResult;
pub use stress::StressScenario;
pub use tail::conditional_value_at_risk;
pub use tail::tail_risk;
pub use tail::value_at_risk;
pub use tail::TailRisk;
