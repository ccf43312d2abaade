//! # Sequential Quadratic Programming
//!
//! $$
//! d_k = \arg\min_d \tfrac12 d^\top B_k d + \nabla f(x_k)^\top d
//! \quad\text{s.t.}\quad E(x_k+d)=b,\; l \le x_k+d \le u
//! $$
//!
//! Linear constraints, damped BFGS Hessian approximation and a backtracking line
//! search on the $\ell_1$ merit function $\phi(x) = f(x) + \mu\lVert Ex-b\rVert_1$.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;
use tracing::trace;

use super::qp::solve_qp;
use super::qp::QpProblem;

pub const MSG_SUCCESS: &str = "Optimization terminated successfully";
pub const MSG_ITERATION_LIMIT: &str = "Iteration limit reached";
pub const MSG_LINE_SEARCH: &str = "Positive directional derivative for linesearch";
pub const MSG_INCOMPATIBLE: &str = "Inequality constraints incompatible";
pub const MSG_NON_FINITE: &str = "Objective function returned a non-finite value";

const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 30;
const BFGS_DAMPING: f64 = 0.2;

/// Solver limits and tolerances.
#[derive(Clone, Debug, PartialEq)]
pub struct SqpConfig {
  pub max_iter: usize,
  /// Stop when the objective changes by less than this at a feasible point.
  pub ftol: f64,
  /// Stop when the step infinity norm falls below this.
  pub xtol: f64,
  pub feasibility_tol: f64,
  pub qp_max_iter: usize,
  pub qp_tol: f64,
}

impl Default for SqpConfig {
  fn default() -> Self {
    Self {
      max_iter: 1000,
      ftol: 1e-10,
      xtol: 1e-10,
      feasibility_tol: 1e-8,
      qp_max_iter: 10_000,
      qp_tol: 1e-10,
    }
  }
}

/// `E x = b` and `l <= x <= u`.
#[derive(Clone, Debug)]
pub(crate) struct LinearConstraints {
  pub a_eq: DMatrix<f64>,
  pub b_eq: DVector<f64>,
  pub lower: DVector<f64>,
  pub upper: DVector<f64>,
}

impl LinearConstraints {
  /// Long-only fully invested: `sum(x) = 1`, `0 <= x <= 1`.
  pub fn budget(n: usize) -> Self {
    Self {
      a_eq: DMatrix::from_element(1, n, 1.0),
      b_eq: DVector::from_element(1, 1.0),
      lower: DVector::zeros(n),
      upper: DVector::from_element(n, 1.0),
    }
  }

  pub fn with_equality(mut self, row: &[f64], rhs: f64) -> Self {
    let m = self.a_eq.nrows();
    let n = self.a_eq.ncols();
    self.a_eq = self.a_eq.insert_row(m, 0.0);
    for (j, v) in row.iter().enumerate().take(n) {
      self.a_eq[(m, j)] = *v;
    }
    self.b_eq = self.b_eq.insert_row(m, rhs);
    self
  }

  fn residual(&self, x: &DVector<f64>) -> DVector<f64> {
    &self.a_eq * x - &self.b_eq
  }

  fn project_bounds(&self, x: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
      x.len(),
      x.iter()
        .zip(self.lower.iter().zip(self.upper.iter()))
        .map(|(&v, (&l, &u))| v.max(l).min(u)),
    )
  }
}

/// Final iterate and diagnostics.
#[derive(Clone, Debug)]
pub(crate) struct SqpOutcome {
  pub x: Vec<f64>,
  pub fun: f64,
  pub iterations: usize,
  pub success: bool,
  pub message: String,
}

fn evaluate<O>(problem: &O, x: &DVector<f64>) -> Option<(f64, DVector<f64>)>
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  let param = x.as_slice().to_vec();
  let f = problem.cost(&param).ok()?;
  let g = problem.gradient(&param).ok()?;
  if !f.is_finite() || g.iter().any(|v| !v.is_finite()) {
    return None;
  }
  Some((f, DVector::from_vec(g)))
}

/// Powell-damped BFGS update; keeps `b` positive definite.
fn bfgs_update(b: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) {
  let bs = &*b * s;
  let sbs = s.dot(&bs);
  if !(sbs > 0.0) {
    return;
  }

  let sy = s.dot(y);
  let theta = if sy >= BFGS_DAMPING * sbs {
    1.0
  } else {
    (1.0 - BFGS_DAMPING) * sbs / (sbs - sy)
  };
  let r = y * theta + &bs * (1.0 - theta);
  let sr = s.dot(&r);
  if !(sr > 0.0) {
    return;
  }

  *b += &r * r.transpose() / sr - &bs * bs.transpose() / sbs;
}

/// Minimize `problem` from `x0` subject to `constraints`.
pub(crate) fn minimize<O>(
  problem: &O,
  x0: &[f64],
  constraints: &LinearConstraints,
  cfg: &SqpConfig,
) -> SqpOutcome
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  let n = x0.len();
  let mut x = constraints.project_bounds(&DVector::from_column_slice(x0));

  let outcome = |x: &DVector<f64>, fun: f64, iterations: usize, success: bool, message: &str| {
    SqpOutcome {
      x: x.as_slice().to_vec(),
      fun,
      iterations,
      success,
      message: message.to_string(),
    }
  };

  let Some((mut f, mut g)) = evaluate(problem, &x) else {
    return outcome(&x, f64::NAN, 0, false, MSG_NON_FINITE);
  };

  let mut b = DMatrix::<f64>::identity(n, n);
  let mut penalty = 0.0_f64;

  for iter in 1..=cfg.max_iter {
    let c = -constraints.residual(&x);
    let lower = &constraints.lower - &x;
    let upper = &constraints.upper - &x;

    let mut qp = solve_qp(
      &QpProblem {
        hessian: &b,
        gradient: &g,
        a_eq: &constraints.a_eq,
        b_eq: &c,
        lower: &lower,
        upper: &upper,
      },
      cfg.qp_max_iter,
      cfg.qp_tol,
    );
    if qp.is_none() && b != DMatrix::identity(n, n) {
      debug!(iter, "QP subproblem failed, resetting Hessian approximation");
      b = DMatrix::identity(n, n);
      qp = solve_qp(
        &QpProblem {
          hessian: &b,
          gradient: &g,
          a_eq: &constraints.a_eq,
          b_eq: &c,
          lower: &lower,
          upper: &upper,
        },
        cfg.qp_max_iter,
        cfg.qp_tol,
      );
    }
    let Some(qp) = qp else {
      return outcome(&x, f, iter, false, MSG_INCOMPATIBLE);
    };

    let d = qp.step;
    let infeasibility = c.amax();
    if d.amax() < cfg.xtol && infeasibility < cfg.feasibility_tol {
      return outcome(&x, f, iter, true, MSG_SUCCESS);
    }

    penalty = penalty.max(2.0 * qp.eq_multipliers.amax());
    let c_norm = c.lp_norm(1);
    let merit = f + penalty * c_norm;
    let slope = g.dot(&d) - penalty * c_norm;

    let mut alpha = 1.0;
    let mut accepted = None;
    for _ in 0..MAX_BACKTRACKS {
      let trial = constraints.project_bounds(&(&x + &d * alpha));
      if let Some((ft, gt)) = evaluate(problem, &trial) {
        let trial_merit = ft + penalty * constraints.residual(&trial).lp_norm(1);
        if trial_merit <= merit + ARMIJO * alpha * slope {
          accepted = Some((trial, ft, gt));
          break;
        }
      }
      alpha *= 0.5;
    }

    let Some((x_new, f_new, g_new)) = accepted else {
      if slope.abs() <= cfg.ftol.max(f64::EPSILON * (1.0 + f.abs())) && infeasibility < cfg.feasibility_tol {
        return outcome(&x, f, iter, true, MSG_SUCCESS);
      }
      return outcome(&x, f, iter, false, MSG_LINE_SEARCH);
    };

    let s = &x_new - &x;
    let y = &g_new - &g;
    bfgs_update(&mut b, &s, &y);
    if b.iter().any(|v| !v.is_finite()) {
      b = DMatrix::identity(n, n);
    }

    let df = (f - f_new).abs();
    trace!(iter, f = f_new, step = s.amax(), alpha, qp_iters = qp.iterations, "sqp step");

    x = x_new;
    f = f_new;
    g = g_new;

    let feasible = constraints.residual(&x).amax() < cfg.feasibility_tol;
    if feasible && (df < cfg.ftol || s.amax() < cfg.xtol) {
      return outcome(&x, f, iter, true, MSG_SUCCESS);
    }
  }

  outcome(&x, f, cfg.max_iter, false, MSG_ITERATION_LIMIT)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  /// sum (x_i - t_i)^2
  struct Quadratic {
    target: Vec<f64>,
  }

  impl CostFunction for Quadratic {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
      Ok(x.iter().zip(self.target.iter()).map(|(a, t)| (a - t).powi(2)).sum())
    }
  }

  impl Gradient for Quadratic {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
      Ok(x.iter().zip(self.target.iter()).map(|(a, t)| 2.0 * (a - t)).collect())
    }
  }

  /// c' x
  struct Linear {
    c: Vec<f64>,
  }

  impl CostFunction for Linear {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
      Ok(x.iter().zip(self.c.iter()).map(|(a, c)| a * c).sum())
    }
  }

  impl Gradient for Linear {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, _x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
      Ok(self.c.clone())
    }
  }

  #[test]
  fn projects_target_onto_simplex() {
    // nearest simplex point to (0.8, 0.6, -0.2) is (0.6, 0.4, 0.0)
    let problem = Quadratic {
      target: vec![0.8, 0.6, -0.2],
    };
    let out = minimize(
      &problem,
      &[1.0 / 3.0; 3],
      &LinearConstraints::budget(3),
      &SqpConfig::default(),
    );

    assert!(out.success, "{}", out.message);
    assert_abs_diff_eq!(out.x[0], 0.6, epsilon = 1e-6);
    assert_abs_diff_eq!(out.x[1], 0.4, epsilon = 1e-6);
    assert_abs_diff_eq!(out.x[2], 0.0, epsilon = 1e-6);
  }

  #[test]
  fn linear_objective_reaches_a_vertex() {
    let problem = Linear {
      c: vec![0.3, -0.1, 0.2],
    };
    let out = minimize(
      &problem,
      &[1.0 / 3.0; 3],
      &LinearConstraints::budget(3),
      &SqpConfig::default(),
    );

    assert!(out.success, "{}", out.message);
    assert_abs_diff_eq!(out.x[1], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(out.fun, -0.1, epsilon = 1e-6);
  }

  #[test]
  fn extra_equality_is_enforced() {
    let problem = Quadratic {
      target: vec![0.0, 0.0, 0.0],
    };
    let constraints = LinearConstraints::budget(3).with_equality(&[1.0, 2.0, 3.0], 2.0);
    let out = minimize(&problem, &[1.0 / 3.0; 3], &constraints, &SqpConfig::default());

    assert!(out.success, "{}", out.message);
    let sum: f64 = out.x.iter().sum();
    let weighted = out.x[0] + 2.0 * out.x[1] + 3.0 * out.x[2];
    assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-7);
    assert_abs_diff_eq!(weighted, 2.0, epsilon = 1e-7);
  }

  #[test]
  fn unreachable_equality_is_incompatible() {
    let problem = Quadratic {
      target: vec![0.0, 0.0],
    };
    let constraints = LinearConstraints::budget(2).with_equality(&[1.0, 1.0], 3.0);
    let cfg = SqpConfig {
      qp_max_iter: 2_000,
      ..Default::default()
    };
    let out = minimize(&problem, &[0.5, 0.5], &constraints, &cfg);

    assert!(!out.success);
    assert_eq!(out.message, MSG_INCOMPATIBLE);
  }
}
