//! # QP Subproblem
//!
//! $$
//! \min_d \tfrac12 d^\top B d + g^\top d
//! \quad\text{s.t.}\quad E d = c,\; l \le d \le u
//! $$
//!
//! ADMM splitting in the OSQP form over the stacked constraint matrix `[E; I]`, with an
//! active-set polishing step that solves the reduced KKT system exactly once the
//! active bounds have settled.

use nalgebra::DMatrix;
use nalgebra::DVector;

const RHO: f64 = 0.1;
const RHO_EQ_SCALE: f64 = 1e3;
const SIGMA: f64 = 1e-6;
const RELAXATION: f64 = 1.6;
const POLISH_EVERY: usize = 25;
const POLISH_TOL: f64 = 1e-9;

/// Borrowed QP data.
pub(crate) struct QpProblem<'a> {
  pub hessian: &'a DMatrix<f64>,
  pub gradient: &'a DVector<f64>,
  pub a_eq: &'a DMatrix<f64>,
  pub b_eq: &'a DVector<f64>,
  pub lower: &'a DVector<f64>,
  pub upper: &'a DVector<f64>,
}

#[derive(Clone, Debug)]
pub(crate) struct QpSolution {
  pub step: DVector<f64>,
  /// Multipliers of the equality rows, sign convention `B d + g + Eᵀλ + ν = 0`.
  pub eq_multipliers: DVector<f64>,
  pub iterations: usize,
}

fn clip(v: &DVector<f64>, lo: &DVector<f64>, hi: &DVector<f64>) -> DVector<f64> {
  DVector::from_iterator(
    v.len(),
    v.iter()
      .zip(lo.iter().zip(hi.iter()))
      .map(|(&x, (&l, &u))| x.max(l).min(u)),
  )
}

/// Exact solve with the bounds in `lower_active`/`upper_active` fixed; `None` if the
/// reduced system is singular or the result violates a bound or a multiplier sign.
fn polish(
  p: &QpProblem,
  lower_active: &[bool],
  upper_active: &[bool],
) -> Option<(DVector<f64>, DVector<f64>)> {
  let n = p.gradient.len();
  let m = p.b_eq.len();

  let mut d = DVector::zeros(n);
  let mut free = Vec::with_capacity(n);
  for i in 0..n {
    if lower_active[i] {
      d[i] = p.lower[i];
    } else if upper_active[i] {
      d[i] = p.upper[i];
    } else {
      free.push(i);
    }
  }

  let nf = free.len();
  if nf == 0 {
    if (p.a_eq * &d - p.b_eq).amax() > POLISH_TOL {
      return None;
    }
    // every variable sits on a bound: least-squares equality multipliers
    let r = p.hessian * &d + p.gradient;
    let gram = p.a_eq * p.a_eq.transpose();
    let lambda = -gram.lu().solve(&(p.a_eq * &r)).unwrap_or_else(|| DVector::zeros(m));
    return check_signs(p, &d, &lambda, lower_active, upper_active)
      .then(|| (clip(&d, p.lower, p.upper), lambda));
  }

  let mut kkt = DMatrix::<f64>::zeros(nf + m, nf + m);
  let mut rhs = DVector::<f64>::zeros(nf + m);
  let fixed_part = p.hessian * &d;
  let eq_fixed = p.a_eq * &d;

  for (a, &i) in free.iter().enumerate() {
    for (b, &j) in free.iter().enumerate() {
      kkt[(a, b)] = p.hessian[(i, j)];
    }
    for k in 0..m {
      kkt[(a, nf + k)] = p.a_eq[(k, i)];
      kkt[(nf + k, a)] = p.a_eq[(k, i)];
    }
    rhs[a] = -(p.gradient[i] + fixed_part[i]);
  }
  for k in 0..m {
    rhs[nf + k] = p.b_eq[k] - eq_fixed[k];
  }

  let sol = kkt.lu().solve(&rhs)?;
  if sol.iter().any(|v| !v.is_finite()) {
    return None;
  }

  for (a, &i) in free.iter().enumerate() {
    d[i] = sol[a];
    if d[i] < p.lower[i] - POLISH_TOL || d[i] > p.upper[i] + POLISH_TOL {
      return None;
    }
  }
  let lambda = DVector::from_iterator(m, (0..m).map(|k| sol[nf + k]));

  if (p.a_eq * &d - p.b_eq).amax() > POLISH_TOL {
    return None;
  }

  check_signs(p, &d, &lambda, lower_active, upper_active)
    .then(|| (clip(&d, p.lower, p.upper), lambda))
}

/// Bound multipliers `ν = -(B d + g + Eᵀλ)` must be non-positive on lower-active and
/// non-negative on upper-active coordinates.
fn check_signs(
  p: &QpProblem,
  d: &DVector<f64>,
  lambda: &DVector<f64>,
  lower_active: &[bool],
  upper_active: &[bool],
) -> bool {
  let stationarity = p.hessian * d + p.gradient + p.a_eq.transpose() * lambda;
  (0..d.len()).all(|i| {
    let nu = -stationarity[i];
    !((lower_active[i] && nu > POLISH_TOL) || (upper_active[i] && nu < -POLISH_TOL))
  })
}

/// Solve the subproblem; `None` when ADMM does not reach `tol` within `max_iter`
/// (typically an infeasible constraint set) or the KKT matrix cannot be factored.
pub(crate) fn solve_qp(p: &QpProblem, max_iter: usize, tol: f64) -> Option<QpSolution> {
  let n = p.gradient.len();
  let m = p.b_eq.len();
  let rows = m + n;

  let mut a = DMatrix::<f64>::zeros(rows, n);
  a.view_mut((0, 0), (m, n)).copy_from(p.a_eq);
  for i in 0..n {
    a[(m + i, i)] = 1.0;
  }

  let l = DVector::from_iterator(rows, p.b_eq.iter().chain(p.lower.iter()).copied());
  let u = DVector::from_iterator(rows, p.b_eq.iter().chain(p.upper.iter()).copied());
  let rho = DVector::from_iterator(
    rows,
    (0..rows).map(|r| if r < m { RHO * RHO_EQ_SCALE } else { RHO }),
  );

  let at = a.transpose();
  let mut k = p.hessian + DMatrix::<f64>::identity(n, n) * SIGMA;
  k += &at * DMatrix::from_diagonal(&rho) * &a;
  let chol = k.cholesky()?;

  let mut x = DVector::<f64>::zeros(n);
  let mut z = clip(&DVector::zeros(rows), &l, &u);
  let mut y = DVector::<f64>::zeros(rows);

  for iter in 1..=max_iter {
    let rhs = &x * SIGMA - p.gradient + &at * (rho.component_mul(&z) - &y);
    let x_tilde = chol.solve(&rhs);
    let z_tilde = &a * &x_tilde;

    let x_next = &x_tilde * RELAXATION + &x * (1.0 - RELAXATION);
    let z_relaxed = &z_tilde * RELAXATION + &z * (1.0 - RELAXATION);
    let z_next = clip(&(&z_relaxed + y.component_div(&rho)), &l, &u);
    y += rho.component_mul(&(&z_relaxed - &z_next));
    x = x_next;
    z = z_next;

    if iter % POLISH_EVERY == 0 {
      let zb = z.rows(m, n);
      let yb = y.rows(m, n);
      let lower_active: Vec<bool> = (0..n).map(|i| zb[i] - p.lower[i] < -yb[i]).collect();
      let upper_active: Vec<bool> = (0..n)
        .map(|i| !lower_active[i] && p.upper[i] - zb[i] < yb[i])
        .collect();

      if let Some((step, eq_multipliers)) = polish(p, &lower_active, &upper_active) {
        return Some(QpSolution {
          step,
          eq_multipliers,
          iterations: iter,
        });
      }
    }

    let ax = &a * &x;
    let px = p.hessian * &x;
    let aty = &at * &y;
    let r_prim = (&ax - &z).amax();
    let r_dual = (&px + p.gradient + &aty).amax();
    let eps_prim = tol + tol * ax.amax().max(z.amax());
    let eps_dual = tol + tol * px.amax().max(aty.amax()).max(p.gradient.amax());

    if !r_prim.is_finite() || !r_dual.is_finite() {
      return None;
    }
    if r_prim <= eps_prim && r_dual <= eps_dual {
      return Some(QpSolution {
        step: z.rows(m, n).into_owned(),
        eq_multipliers: y.rows(0, m).into_owned(),
        iterations: iter,
      });
    }
  }

  None
}
