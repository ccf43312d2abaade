//! # Errors
//!
//! Error taxonomy shared by every analytics module.

use thiserror::Error;

/// Error type for portfolio analytics operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FolioError {
  /// Too few periods or assets to produce a stable estimate.
  #[error("Insufficient data for {context}: required {required}, available {available}")]
  InsufficientData {
    required: usize,
    available: usize,
    context: String,
  },

  /// The solver did not converge. Carries the solver diagnostic.
  #[error("Optimization failed: {0}")]
  OptimizationFailure(String),

  /// Singular covariance, zero variance, non-positive prices and similar.
  #[error("Degenerate input: {0}")]
  DegenerateInput(String),

  /// Shape mismatch or out-of-range argument.
  #[error("Invalid input: {0}")]
  InvalidInput(String),

  /// Failure reported by a price provider or result sink.
  #[error("Collaborator error: {0}")]
  Provider(String),
}

impl FolioError {
  pub(crate) fn insufficient(required: usize, available: usize, context: impl Into<String>) -> Self {
    Self::InsufficientData {
      required,
      available,
      context: context.into(),
    }
  }
}

/// Result type for portfolio analytics operations.
pub type Result<T> = std::result::Result<T, FolioError>;
