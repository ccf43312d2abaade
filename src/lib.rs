//! # folio-rs
//!
//! $$
//! \mathbf w^\* = \arg\min_{\mathbf 1^\top w = 1,\ 0 \le w \le 1} f(w;\mu,\Sigma,\beta)
//! $$
//!
//! Constrained mean-variance portfolio optimization and risk analytics over historical
//! return series.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`data`] | Price history, aligned returns, weights and collaborator contracts. |
//! | [`beta`] | Market beta of assets and portfolios. |
//! | [`optimizer`] | Four objectives solved by sequential quadratic programming. |
//! | [`frontier`] | Efficient frontier sweep. |
//! | [`risk`] | VaR, CVaR, drawdown, concentration, stress tests and risk score. |
//! | [`simulation`] | Monte Carlo wealth projection. |
//! | [`rebalance`] | Current allocation and rebalancing trades. |
//! | [`engine`] | Configured facade over all of the above. |

pub mod beta;
pub mod data;
pub mod engine;
pub mod error;
pub mod frontier;
pub mod optimizer;
pub mod rebalance;
pub mod risk;
pub mod simulation;

pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use error::FolioError;
pub use error::Result;
pub use optimizer::Objective;
pub use optimizer::OptimizationResult;
